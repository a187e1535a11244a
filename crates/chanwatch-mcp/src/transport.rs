//! MCP Transport layer implementations

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};

/// Transport trait for MCP communication
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&mut self, message: Value) -> io::Result<()>;
    async fn receive(&mut self) -> io::Result<Option<Value>>;
    async fn close(&mut self) -> io::Result<()>;
}

/// Stdio transport for subprocess communication
///
/// Messages are newline-delimited JSON on the child's stdin/stdout. The
/// child's stderr is inherited so server diagnostics reach the console.
pub struct StdioTransport {
    child: Child,
    reader: Option<BufReader<ChildStdout>>,
}

impl StdioTransport {
    /// Spawn `command args...` with `env` added to the inherited environment
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> io::Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("Failed to capture stdout"))?;

        tracing::debug!(command, pid = ?child.id(), "spawned stdio transport");

        Ok(Self {
            child,
            reader: Some(BufReader::new(stdout)),
        })
    }

    /// OS process id of the server, if it is still running
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, message: Value) -> io::Result<()> {
        let stdin = self
            .child
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::other("Stdin not available"))?;

        let json = serde_json::to_string(&message)?;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;

        Ok(())
    }

    async fn receive(&mut self) -> io::Result<Option<Value>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| io::Error::other("Reader not available"))?;

        loop {
            let mut line = String::new();
            let n = reader.read_line(&mut line).await?;

            if n == 0 {
                return Ok(None);
            }
            if line.trim().is_empty() {
                continue;
            }

            let value: Value = serde_json::from_str(&line)?;
            return Ok(Some(value));
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        self.reader = None;
        // Already-exited children are fine.
        if self.child.id().is_some() {
            self.child.kill().await?;
        }
        Ok(())
    }
}
