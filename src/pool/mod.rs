//! Per-phase reusable sandbox containers.
//!
//! On phase entry the pool starts one long-lived container per role, its
//! entrypoint overridden to an idle wait so the agent binary runs via
//! `exec` once per iteration with the adapter's original entrypoint. A
//! container that fails with a non-exit error is marked unhealthy; the next
//! invocation for that role returns an error and the caller falls back to
//! one-shot host execution. On phase exit all containers are force-removed.
//!
//! Names are deterministic for operator debuggability:
//! `agentium-<last-8-of-session-id>-<phase>-<role>`.

use crate::adapter::{AgentAdapter, AgentInvocation, AgentOutcome};
use crate::errors::AgentError;
use crate::task::{Phase, Role};
use anyhow::{Context, Result};
use bollard::Docker;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, HostConfig, Mount, MountTypeEnum};
use bollard::query_parameters::{CreateContainerOptions, CreateImageOptions, RemoveContainerOptions, StartContainerOptions};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Idle command keeping a role container alive between iterations.
const IDLE_ENTRYPOINT: &[&str] = &["sleep", "infinity"];

/// Deterministic container name for a `{session, phase, role}` triple.
pub fn container_name(session_id: &str, phase: Phase, role: Role) -> String {
    let tail: String = session_id
        .chars()
        .rev()
        .take(8)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("agentium-{}-{}-{}", tail, phase.slug(), role)
}

#[derive(Debug, Clone)]
struct PoolEntry {
    container_id: String,
    name: String,
    entrypoint: Vec<String>,
    healthy: bool,
}

/// Pool of role containers owned by the current phase.
pub struct ContainerPool {
    docker: Docker,
    session_id: String,
    phase: Phase,
    entries: Mutex<HashMap<Role, PoolEntry>>,
}

impl ContainerPool {
    /// Connect to the Docker daemon. None when Docker is unreachable, in
    /// which case the caller stays on one-shot invocation for the session.
    pub async fn connect() -> Option<Docker> {
        let docker = Docker::connect_with_socket_defaults().ok()?;
        if docker.ping().await.is_err() {
            return None;
        }
        Some(docker)
    }

    /// Start one idle container per role that has a container image.
    ///
    /// `auth_mounts` are host→container bind mounts carrying credentials;
    /// `workdir` is bind-mounted read-write at `/workspace`.
    pub async fn start(
        docker: Docker,
        session_id: &str,
        phase: Phase,
        roles: &[(Role, std::sync::Arc<dyn AgentAdapter>)],
        workdir: &std::path::Path,
        auth_mounts: &[(String, String)],
    ) -> Result<Self> {
        let pool = Self {
            docker,
            session_id: session_id.to_string(),
            phase,
            entries: Mutex::new(HashMap::new()),
        };

        for (role, adapter) in roles {
            let Some(image) = adapter.container_image() else {
                continue;
            };
            let entry = pool
                .start_role_container(*role, adapter.as_ref(), image, workdir, auth_mounts)
                .await
                .with_context(|| format!("Failed to start {} container", role))?;
            pool.entries.lock().unwrap().insert(*role, entry);
        }

        Ok(pool)
    }

    async fn start_role_container(
        &self,
        role: Role,
        adapter: &dyn AgentAdapter,
        image: &str,
        workdir: &std::path::Path,
        auth_mounts: &[(String, String)],
    ) -> Result<PoolEntry> {
        self.ensure_image(image).await?;

        let mut mounts = vec![Mount {
            target: Some("/workspace".to_string()),
            source: Some(workdir.to_string_lossy().to_string()),
            typ: Some(MountTypeEnum::BIND),
            read_only: Some(false),
            ..Default::default()
        }];
        for (host, container) in auth_mounts {
            mounts.push(Mount {
                target: Some(container.clone()),
                source: Some(host.clone()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(true),
                ..Default::default()
            });
        }

        let mut labels = HashMap::new();
        labels.insert("agentium.session".to_string(), self.session_id.clone());
        labels.insert("agentium.phase".to_string(), self.phase.slug());
        labels.insert("agentium.role".to_string(), role.to_string());

        let config = ContainerCreateBody {
            image: Some(image.to_string()),
            entrypoint: Some(IDLE_ENTRYPOINT.iter().map(|s| s.to_string()).collect()),
            working_dir: Some("/workspace".to_string()),
            labels: Some(labels),
            host_config: Some(HostConfig {
                mounts: Some(mounts),
                ..Default::default()
            }),
            ..Default::default()
        };

        let name = container_name(&self.session_id, self.phase, role);
        let create_opts = CreateContainerOptions {
            name: Some(name.clone()),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(create_opts), config)
            .await
            .with_context(|| format!("Failed to create container {}", name))?;

        self.docker
            .start_container(&response.id, None::<StartContainerOptions>)
            .await
            .with_context(|| format!("Failed to start container {}", name))?;

        info!(container = %name, image, "role container started");

        Ok(PoolEntry {
            container_id: response.id,
            name,
            entrypoint: adapter.container_entrypoint(),
            healthy: true,
        })
    }

    /// Run one agent turn by exec-ing into the role's pooled container.
    ///
    /// Errors with `ContainerUnhealthy` when the role has no healthy
    /// container, signalling the caller to fall back to one-shot.
    pub async fn exec(
        &self,
        role: Role,
        adapter: &dyn AgentAdapter,
        invocation: &AgentInvocation,
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome, AgentError> {
        let entry = {
            let entries = self.entries.lock().unwrap();
            entries.get(&role).cloned()
        };
        let Some(entry) = entry else {
            return Err(AgentError::ContainerUnhealthy {
                container: container_name(&self.session_id, self.phase, role),
            });
        };
        if !entry.healthy {
            return Err(AgentError::ContainerUnhealthy {
                container: entry.name,
            });
        }

        match self.exec_inner(&entry, adapter, invocation, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(AgentError::Cancelled) => Err(AgentError::Cancelled),
            Err(err) => {
                // Non-exit failure: poison this container for the phase.
                self.mark_unhealthy(role);
                Err(err)
            }
        }
    }

    async fn exec_inner(
        &self,
        entry: &PoolEntry,
        adapter: &dyn AgentAdapter,
        invocation: &AgentInvocation,
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome, AgentError> {
        let stdin_prompt = adapter.stdin_prompt(invocation);
        let mut cmd = entry.entrypoint.clone();
        cmd.extend(adapter.build_command(invocation));

        let exec = self
            .docker
            .create_exec(
                &entry.container_id,
                CreateExecOptions {
                    cmd: Some(cmd),
                    env: Some(adapter.build_env(invocation)),
                    attach_stdin: Some(stdin_prompt.is_some()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: Some("/workspace".to_string()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| AgentError::ExecFailed(format!("create_exec: {}", e)))?;

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| AgentError::ExecFailed(format!("start_exec: {}", e)))?;

        let (mut stdout, mut stderr) = (String::new(), String::new());
        match started {
            StartExecResults::Attached { mut output, mut input } => {
                if let Some(prompt) = stdin_prompt {
                    input
                        .write_all(prompt.as_bytes())
                        .await
                        .map_err(|e| AgentError::ExecFailed(format!("stdin write: {}", e)))?;
                    input
                        .shutdown()
                        .await
                        .map_err(|e| AgentError::ExecFailed(format!("stdin close: {}", e)))?;
                }

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            warn!(container = %entry.name, "cancellation observed during exec");
                            return Err(AgentError::Cancelled);
                        }
                        chunk = output.next() => match chunk {
                            Some(Ok(bollard::container::LogOutput::StdOut { message })) => {
                                stdout.push_str(&String::from_utf8_lossy(&message));
                            }
                            Some(Ok(bollard::container::LogOutput::StdErr { message })) => {
                                stderr.push_str(&String::from_utf8_lossy(&message));
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                return Err(AgentError::ExecFailed(format!("exec stream: {}", e)));
                            }
                            None => break,
                        },
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(AgentError::ExecFailed("exec detached unexpectedly".into()));
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| AgentError::ExecFailed(format!("inspect_exec: {}", e)))?;
        let exit_code = inspect.exit_code.unwrap_or(-1) as i32;

        debug!(container = %entry.name, exit_code, "exec finished");
        Ok(adapter.parse_output(exit_code, &stdout, &stderr))
    }

    /// Poison a role's container; subsequent exec calls error out.
    pub fn mark_unhealthy(&self, role: Role) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(&role) {
            warn!(container = %entry.name, "marking container unhealthy");
            entry.healthy = false;
        }
    }

    /// Whether a healthy container exists for the role.
    pub fn is_healthy(&self, role: Role) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(&role)
            .is_some_and(|e| e.healthy)
    }

    /// Force-remove every container the pool started.
    pub async fn stop_all(&self) {
        let entries: Vec<PoolEntry> = {
            let mut map = self.entries.lock().unwrap();
            map.drain().map(|(_, v)| v).collect()
        };
        for entry in entries {
            let opts = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            if let Err(e) = self
                .docker
                .remove_container(&entry.container_id, Some(opts))
                .await
            {
                warn!(container = %entry.name, error = %e, "failed to remove container");
            } else {
                debug!(container = %entry.name, "container removed");
            }
        }
    }

    /// Ensure an image is available locally, pulling if necessary.
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }
        let opts = CreateImageOptions {
            from_image: Some(image.to_string()),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(opts), None, None);
        while let Some(result) = stream.next().await {
            result.with_context(|| format!("Failed to pull image {}", image))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_name_uses_last_eight_of_session() {
        let name = container_name("0123456789abcdef", Phase::Implement, Role::Worker);
        assert_eq!(name, "agentium-89abcdef-implement-worker");
    }

    #[test]
    fn test_container_name_short_session_id() {
        let name = container_name("abc", Phase::Plan, Role::Judge);
        assert_eq!(name, "agentium-abc-plan-judge");
    }

    #[test]
    fn test_container_name_is_deterministic() {
        let a = container_name("session-12345678", Phase::Docs, Role::Reviewer);
        let b = container_name("session-12345678", Phase::Docs, Role::Reviewer);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_connect_does_not_panic_without_docker() {
        // Environments without Docker get None and stay on one-shot.
        let _ = ContainerPool::connect().await;
    }
}
