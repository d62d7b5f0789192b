//! One-shot host execution of an agent turn.
//!
//! Used when container reuse is disabled, the pool failed to start, or a
//! pooled container went unhealthy. The subprocess inherits the turn's
//! cancellation token; on cancel the child is killed and given a bounded
//! grace period to exit.

use super::{AgentAdapter, AgentInvocation, AgentOutcome};
use crate::errors::AgentError;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Grace period between kill and abandoning the child.
const KILL_GRACE: Duration = Duration::from_secs(10);

/// Run one agent turn as a direct subprocess and parse its output.
pub async fn run_one_shot(
    adapter: &dyn AgentAdapter,
    invocation: &AgentInvocation,
    cancel: &CancellationToken,
) -> Result<AgentOutcome, AgentError> {
    let entrypoint = adapter.container_entrypoint();
    let program = entrypoint
        .first()
        .cloned()
        .ok_or_else(|| AgentError::Other(anyhow::anyhow!("adapter has an empty entrypoint")))?;

    let mut cmd = Command::new(&program);
    cmd.args(&entrypoint[1..])
        .args(adapter.build_command(invocation))
        .current_dir(&invocation.workdir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for pair in adapter.build_env(invocation) {
        if let Some((key, value)) = pair.split_once('=') {
            cmd.env(key, value);
        }
    }

    debug!(
        role = %invocation.role,
        phase = %invocation.phase,
        iteration = invocation.iteration,
        program = %program,
        "spawning agent turn"
    );

    let mut child = cmd.spawn().map_err(|source| AgentError::SpawnFailed {
        command: program.clone(),
        source,
    })?;

    if let Some(prompt) = adapter.stdin_prompt(invocation) {
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| AgentError::Other(anyhow::anyhow!("failed to write prompt: {}", e)))?;
            stdin
                .shutdown()
                .await
                .map_err(|e| AgentError::Other(anyhow::anyhow!("failed to close stdin: {}", e)))?;
        }
    } else {
        drop(child.stdin.take());
    }

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| AgentError::Other(anyhow::anyhow!("failed to capture stdout")))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| AgentError::Other(anyhow::anyhow!("failed to capture stderr")))?;

    let read_streams = async {
        let mut stdout = String::new();
        let mut stderr = String::new();
        let out = stdout_pipe.read_to_string(&mut stdout);
        let err = stderr_pipe.read_to_string(&mut stderr);
        let (out_res, err_res) = tokio::join!(out, err);
        out_res.map_err(|e| anyhow::anyhow!("failed to read stdout: {}", e))?;
        err_res.map_err(|e| anyhow::anyhow!("failed to read stderr: {}", e))?;
        Ok::<(String, String), anyhow::Error>((stdout, stderr))
    };

    let (stdout, stderr) = tokio::select! {
        _ = cancel.cancelled() => {
            warn!(role = %invocation.role, "cancellation observed, killing agent process");
            let _ = child.start_kill();
            let _ = tokio::time::timeout(KILL_GRACE, child.wait()).await;
            return Err(AgentError::Cancelled);
        }
        read = read_streams => read.map_err(AgentError::Other)?,
    };

    let status = child
        .wait()
        .await
        .map_err(|e| AgentError::Other(anyhow::anyhow!("failed to wait for agent: {}", e)))?;
    let exit_code = status.code().unwrap_or(-1);

    debug!(
        role = %invocation.role,
        exit_code,
        stdout_bytes = stdout.len(),
        "agent turn finished"
    );

    Ok(adapter.parse_output(exit_code, &stdout, &stderr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AgentInvocation;
    use crate::task::{Phase, Role};
    use anyhow::Result;
    use std::path::PathBuf;

    /// Test adapter that echoes its stdin back through `cat`.
    struct CatAdapter;

    impl AgentAdapter for CatAdapter {
        fn name(&self) -> &str {
            "cat"
        }
        fn container_image(&self) -> Option<&str> {
            None
        }
        fn container_entrypoint(&self) -> Vec<String> {
            vec!["cat".to_string()]
        }
        fn build_env(&self, _: &AgentInvocation) -> Vec<String> {
            Vec::new()
        }
        fn build_command(&self, _: &AgentInvocation) -> Vec<String> {
            Vec::new()
        }
        fn stdin_prompt(&self, invocation: &AgentInvocation) -> Option<String> {
            Some(invocation.prompt.clone())
        }
        fn parse_output(&self, exit_code: i32, stdout: &str, _: &str) -> AgentOutcome {
            AgentOutcome {
                raw_text: stdout.to_string(),
                assistant_text: stdout.to_string(),
                exit_code,
                ..Default::default()
            }
        }
        fn validate(&self) -> Result<()> {
            Ok(())
        }
    }

    fn invocation(prompt: &str) -> AgentInvocation {
        AgentInvocation {
            session_id: "sess".to_string(),
            task_id: "1".to_string(),
            repository: "octo/widgets".to_string(),
            phase: Phase::Plan,
            role: Role::Worker,
            iteration: 1,
            prompt: prompt.to_string(),
            workdir: PathBuf::from("."),
        }
    }

    #[tokio::test]
    async fn test_one_shot_round_trips_stdin() {
        let cancel = CancellationToken::new();
        let outcome = run_one_shot(&CatAdapter, &invocation("hello agent"), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.raw_text, "hello agent");
        assert!(outcome.succeeded());
    }

    #[tokio::test]
    async fn test_one_shot_missing_binary_is_spawn_error() {
        struct Missing;
        impl AgentAdapter for Missing {
            fn name(&self) -> &str {
                "missing"
            }
            fn container_image(&self) -> Option<&str> {
                None
            }
            fn container_entrypoint(&self) -> Vec<String> {
                vec!["agentium-no-such-binary".to_string()]
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
            fn parse_output(&self, exit_code: i32, _: &str, _: &str) -> AgentOutcome {
                AgentOutcome {
                    exit_code,
                    ..Default::default()
                }
            }
            fn validate(&self) -> Result<()> {
                Ok(())
            }
        }

        let cancel = CancellationToken::new();
        let err = run_one_shot(&Missing, &invocation(""), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn test_one_shot_pre_cancelled_token() {
        struct Sleepy;
        impl AgentAdapter for Sleepy {
            fn name(&self) -> &str {
                "sleepy"
            }
            fn container_image(&self) -> Option<&str> {
                None
            }
            fn container_entrypoint(&self) -> Vec<String> {
                vec!["sleep".to_string()]
            }
            fn build_env(&self, _: &AgentInvocation) -> Vec<String> {
                Vec::new()
            }
            fn build_command(&self, _: &AgentInvocation) -> Vec<String> {
                vec!["30".to_string()]
            }
            fn stdin_prompt(&self, _: &AgentInvocation) -> Option<String> {
                None
            }
            fn parse_output(&self, exit_code: i32, _: &str, _: &str) -> AgentOutcome {
                AgentOutcome {
                    exit_code,
                    ..Default::default()
                }
            }
            fn validate(&self) -> Result<()> {
                Ok(())
            }
        }

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run_one_shot(&Sleepy, &invocation(""), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
