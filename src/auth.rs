//! Credential freshness checks.
//!
//! The phase loop calls [`TokenRefresher::ensure_fresh`] before every
//! iteration so the next agent subprocess starts with valid credentials.
//! A refresh failure blocks the task (fail-closed); the loop never runs an
//! agent turn on known-stale auth.

use anyhow::Result;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn ensure_fresh(&self) -> Result<()>;
}

/// Default refresher for setups where the agent CLI manages its own auth.
pub struct NoopRefresher;

#[async_trait]
impl TokenRefresher for NoopRefresher {
    async fn ensure_fresh(&self) -> Result<()> {
        Ok(())
    }
}

/// Runs a configured shell command; non-zero exit means stale credentials.
pub struct CommandRefresher {
    command: String,
}

impl CommandRefresher {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }
}

#[async_trait]
impl TokenRefresher for CommandRefresher {
    async fn ensure_fresh(&self) -> Result<()> {
        debug!(command = %self.command, "running token refresh command");
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("failed to spawn refresh command: {}", e))?;

        if !output.status.success() {
            anyhow::bail!(
                "refresh command exited {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}
