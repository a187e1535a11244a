//! Provider catalog: default model and credential variables per backend

/// Static provider entry
#[derive(Debug, Clone, Copy)]
pub struct Provider {
    pub id: &'static str,
    pub name: &'static str,
    pub default_model: &'static str,
    /// Checked in order; empty means no key is needed
    pub api_key_envs: &'static [&'static str],
}

const PROVIDERS: &[Provider] = &[
    Provider {
        id: "gemini",
        name: "Google Gemini",
        default_model: "gemini-2.5-flash",
        api_key_envs: &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
    },
    Provider {
        id: "anthropic",
        name: "Anthropic",
        default_model: "claude-sonnet-4-5-20250929",
        api_key_envs: &["ANTHROPIC_API_KEY"],
    },
    Provider {
        id: "openai",
        name: "OpenAI",
        default_model: "gpt-4o",
        api_key_envs: &["OPENAI_API_KEY"],
    },
    Provider {
        id: "deepseek",
        name: "DeepSeek",
        default_model: "deepseek-chat",
        api_key_envs: &["DEEPSEEK_API_KEY"],
    },
    Provider {
        id: "groq",
        name: "Groq",
        default_model: "llama-3.3-70b-versatile",
        api_key_envs: &["GROQ_API_KEY"],
    },
    Provider {
        id: "ollama",
        name: "Ollama",
        default_model: "llama3.2",
        api_key_envs: &[],
    },
];

/// Get a provider by ID
pub fn get(provider_id: &str) -> Option<&'static Provider> {
    PROVIDERS.iter().find(|p| p.id == provider_id)
}

/// Get all provider IDs
pub fn ids() -> impl Iterator<Item = &'static str> {
    PROVIDERS.iter().map(|p| p.id)
}

/// Get default model ID for a provider
pub fn default_model(provider_id: &str) -> Option<&'static str> {
    get(provider_id).map(|p| p.default_model)
}

/// Get API key environment variables for a provider
pub fn api_key_envs(provider_id: &str) -> &'static [&'static str] {
    get(provider_id).map(|p| p.api_key_envs).unwrap_or(&[])
}
