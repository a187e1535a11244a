//! Configuration file tests
//!
//! Tests for ConfigManager loading and saving.

use chanwatch_core::config::{Config, ConfigManager, McpServerConfig};
use chanwatch_core::error::Error;
use std::fs;
use tempfile::TempDir;

fn setup_config_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

mod config_manager_tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = setup_config_dir();
        let path = dir.path().join("config.toml");

        let manager = ConfigManager::with_path(path.clone()).unwrap();

        assert_eq!(manager.path(), path.as_path());
        assert_eq!(manager.config().monitor.interval_secs, 30);
        assert_eq!(manager.config().mcp_servers.len(), 3);
        assert!(!path.exists());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = setup_config_dir();
        let path = dir.path().join("nested").join("config.toml");

        let mut manager = ConfigManager::with_path(path.clone()).unwrap();
        {
            let config = manager.config_mut();
            config.monitor.channel_id = Some("C0123".to_string());
            config.monitor.interval_secs = 45;
            config.mcp_servers.insert(
                "calendar".to_string(),
                McpServerConfig::new("python")
                    .with_args(vec!["calendar_server.py".to_string()])
                    .with_env("GOOGLE_CALENDAR_TOKEN", "${GOOGLE_CALENDAR_TOKEN}")
                    .with_enabled(false),
            );
        }
        manager.save().unwrap();
        assert!(path.exists());

        let reloaded = ConfigManager::with_path(path).unwrap().into_config();
        assert_eq!(reloaded.monitor.channel_id.as_deref(), Some("C0123"));
        assert_eq!(reloaded.monitor.interval_secs, 45);
        assert_eq!(reloaded.mcp_servers.len(), 4);
        let calendar = &reloaded.mcp_servers["calendar"];
        assert!(!calendar.enabled);
        assert_eq!(calendar.required_credentials(), vec!["GOOGLE_CALENDAR_TOKEN"]);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = setup_config_dir();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[monitor\ninterval_secs = ").unwrap();

        let result = ConfigManager::with_path(path);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_saved_default_config_parses_back() {
        let dir = setup_config_dir();
        let path = dir.path().join("config.toml");

        ConfigManager::with_path(path.clone()).unwrap().save().unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let parsed: Config = toml::from_str(&content).unwrap();

        assert_eq!(parsed.agent.model, None);
        assert_eq!(parsed.agent.model_name().unwrap(), "gemini-2.5-flash");
        assert_eq!(parsed.mcp_servers["maps"].args[1], "@modelcontextprotocol/server-google-maps");
    }
}
