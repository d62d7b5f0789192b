//! Typed error hierarchy for the agentium controller.
//!
//! Two top-level enums cover the two subsystems the loop must match on:
//! - `AgentError` — a single agent turn failed (spawn, exec, cancellation)
//! - `PhaseLoopError` — the phase loop itself cannot continue
//!
//! Everything else flows through `anyhow` at the application seams.

use thiserror::Error;

/// Errors from running one agent turn (worker, reviewer, judge or assessor).
#[derive(Debug, Error)]
pub enum AgentError {
    /// The cancellation token fired while the turn was in flight.
    #[error("agent turn cancelled")]
    Cancelled,

    #[error("failed to spawn agent process '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("container {container} was marked unhealthy")]
    ContainerUnhealthy { container: String },

    #[error("container exec failed: {0}")]
    ExecFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AgentError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Cancelled)
    }
}

/// Errors that stop the phase loop rather than a single iteration.
#[derive(Debug, Error)]
pub enum PhaseLoopError {
    /// Credential refresh failed; the task is set to BLOCKED.
    #[error("token refresh failed: {0}")]
    TokenRefresh(String),

    /// Cancellation observed at a loop boundary; no phase advance happens.
    #[error("phase loop cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PhaseLoopError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PhaseLoopError::Cancelled)
    }
}
