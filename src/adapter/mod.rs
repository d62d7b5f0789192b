//! Agent adapters.
//!
//! An adapter describes how to invoke one agent CLI (image, entrypoint,
//! argv, env, prompt delivery) and how to interpret its output. The
//! controller treats every agent as an untrusted subprocess behind this
//! capability set; adapters are registered by name at startup and routed
//! per role.

mod claude;
mod runner;

pub use claude::ClaudeAdapter;
pub use runner::run_one_shot;

use crate::task::{Phase, Role};
use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything an adapter needs to build one agent turn.
#[derive(Debug, Clone)]
pub struct AgentInvocation {
    pub session_id: String,
    pub task_id: String,
    pub repository: String,
    pub phase: Phase,
    pub role: Role,
    pub iteration: u32,
    /// The composed role prompt (see [`crate::prompt`]).
    pub prompt: String,
    pub workdir: PathBuf,
}

/// Structured result of one agent turn.
#[derive(Debug, Clone, Default)]
pub struct AgentOutcome {
    /// Full text output (final result if the protocol provides one).
    pub raw_text: String,
    /// Assistant-authored text only; what gets posted as comments.
    pub assistant_text: String,
    /// Short summary for logs and the event journal.
    pub summary: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub exit_code: i32,
    /// Adapter-reported status, when the protocol carries one.
    pub agent_status: Option<String>,
}

impl AgentOutcome {
    /// A turn succeeded when the process exited cleanly and the protocol
    /// did not flag an error.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && self.agent_status.as_deref() != Some("error")
    }
}

/// Capability set every agent adapter provides.
pub trait AgentAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Image for containerized execution; None means host-only.
    fn container_image(&self) -> Option<&str>;

    /// The agent binary and any fixed leading arguments. Containerized
    /// turns exec this entrypoint; host turns spawn it directly.
    fn container_entrypoint(&self) -> Vec<String>;

    /// `KEY=VALUE` environment for the turn.
    fn build_env(&self, invocation: &AgentInvocation) -> Vec<String>;

    /// Arguments appended after the entrypoint for this turn.
    fn build_command(&self, invocation: &AgentInvocation) -> Vec<String>;

    /// Prompt to deliver over stdin. None means the adapter embeds the
    /// prompt in its command instead.
    fn stdin_prompt(&self, invocation: &AgentInvocation) -> Option<String>;

    /// Interpret a finished turn's output.
    fn parse_output(&self, exit_code: i32, stdout: &str, stderr: &str) -> AgentOutcome;

    /// Cheap configuration sanity check at registration time.
    fn validate(&self) -> Result<()>;
}

/// Which adapter serves each role. The same adapter may serve all three.
#[derive(Debug, Clone)]
pub struct RoleRouting {
    pub worker: String,
    pub reviewer: String,
    pub judge: String,
}

impl RoleRouting {
    /// Route every role to a single adapter.
    pub fn uniform(name: &str) -> Self {
        Self {
            worker: name.to_string(),
            reviewer: name.to_string(),
            judge: name.to_string(),
        }
    }

    pub fn for_role(&self, role: Role) -> &str {
        match role {
            Role::Worker => &self.worker,
            Role::Reviewer => &self.reviewer,
            Role::Judge => &self.judge,
        }
    }
}

/// Adapters registered by name at startup.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn AgentAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn AgentAdapter>) -> Result<()> {
        adapter.validate()?;
        self.adapters.insert(adapter.name().to_string(), adapter);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentAdapter>> {
        self.adapters.get(name).cloned()
    }

    /// Resolve the adapter for a role, erroring on unknown routing.
    pub fn for_role(&self, routing: &RoleRouting, role: Role) -> Result<Arc<dyn AgentAdapter>> {
        let name = routing.for_role(role);
        self.get(name)
            .ok_or_else(|| anyhow::anyhow!("No adapter registered under '{}'", name))
    }

    pub fn names(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullAdapter;

    impl AgentAdapter for NullAdapter {
        fn name(&self) -> &str {
            "null"
        }
        fn container_image(&self) -> Option<&str> {
            None
        }
        fn container_entrypoint(&self) -> Vec<String> {
            vec!["true".to_string()]
        }
        fn build_env(&self, _: &AgentInvocation) -> Vec<String> {
            Vec::new()
        }
        fn build_command(&self, _: &AgentInvocation) -> Vec<String> {
            Vec::new()
        }
        fn stdin_prompt(&self, _: &AgentInvocation) -> Option<String> {
            None
        }
        fn parse_output(&self, exit_code: i32, stdout: &str, _: &str) -> AgentOutcome {
            AgentOutcome {
                raw_text: stdout.to_string(),
                exit_code,
                ..Default::default()
            }
        }
        fn validate(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_register_and_get() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(NullAdapter)).unwrap();
        assert!(registry.get("null").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_role_routing_uniform() {
        let routing = RoleRouting::uniform("claude");
        assert_eq!(routing.for_role(Role::Worker), "claude");
        assert_eq!(routing.for_role(Role::Judge), "claude");
    }

    #[test]
    fn test_registry_for_role_unknown_errors() {
        let registry = AdapterRegistry::new();
        let routing = RoleRouting::uniform("ghost");
        assert!(registry.for_role(&routing, Role::Worker).is_err());
    }

    #[test]
    fn test_outcome_succeeded() {
        let ok = AgentOutcome {
            exit_code: 0,
            ..Default::default()
        };
        assert!(ok.succeeded());

        let exited = AgentOutcome {
            exit_code: 1,
            ..Default::default()
        };
        assert!(!exited.succeeded());

        let flagged = AgentOutcome {
            exit_code: 0,
            agent_status: Some("error".to_string()),
            ..Default::default()
        };
        assert!(!flagged.succeeded());
    }
}
