//! Default adapter for the Claude CLI.
//!
//! Spawns `claude --print --output-format stream-json --verbose`, delivers
//! the prompt over stdin and folds the stream-json transcript into an
//! [`AgentOutcome`].

use super::{AgentAdapter, AgentInvocation, AgentOutcome};
use crate::stream::collect_output;
use crate::util::extract_summary;
use anyhow::Result;

const SUMMARY_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct ClaudeAdapter {
    command: String,
    image: Option<String>,
    skip_permissions: bool,
}

impl ClaudeAdapter {
    pub fn new(command: &str, image: Option<String>, skip_permissions: bool) -> Self {
        Self {
            command: command.to_string(),
            image,
            skip_permissions,
        }
    }
}

impl Default for ClaudeAdapter {
    fn default() -> Self {
        Self::new("claude", None, true)
    }
}

impl AgentAdapter for ClaudeAdapter {
    fn name(&self) -> &str {
        "claude"
    }

    fn container_image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    fn container_entrypoint(&self) -> Vec<String> {
        vec![self.command.clone()]
    }

    fn build_env(&self, invocation: &AgentInvocation) -> Vec<String> {
        vec![
            format!("AGENTIUM_SESSION={}", invocation.session_id),
            format!("AGENTIUM_TASK={}", invocation.task_id),
            format!("AGENTIUM_PHASE={}", invocation.phase),
            format!("AGENTIUM_ROLE={}", invocation.role),
        ]
    }

    fn build_command(&self, _invocation: &AgentInvocation) -> Vec<String> {
        let mut args = Vec::new();
        if self.skip_permissions {
            args.push("--dangerously-skip-permissions".to_string());
        }
        args.push("--print".to_string());
        args.push("--output-format".to_string());
        args.push("stream-json".to_string());
        args.push("--verbose".to_string());
        args
    }

    fn stdin_prompt(&self, invocation: &AgentInvocation) -> Option<String> {
        Some(invocation.prompt.clone())
    }

    fn parse_output(&self, exit_code: i32, stdout: &str, stderr: &str) -> AgentOutcome {
        let collected = collect_output(stdout);
        let text = if collected.text.trim().is_empty() && !stderr.trim().is_empty() {
            stderr.to_string()
        } else {
            collected.text
        };
        let status = if exit_code != 0 || collected.is_error {
            Some("error".to_string())
        } else {
            Some("success".to_string())
        };
        AgentOutcome {
            summary: extract_summary(&text, SUMMARY_CHARS),
            raw_text: text,
            assistant_text: collected.assistant_text,
            input_tokens: collected.input_tokens,
            output_tokens: collected.output_tokens,
            exit_code,
            agent_status: status,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            anyhow::bail!("claude adapter has an empty command");
        }
        Ok(())
    }
}
