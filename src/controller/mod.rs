//! The phase loop engine.
//!
//! This module owns the controller: the outer state machine that sequences
//! phases ([`sequencer`]), the inner bounded Worker→Reviewer→Judge loop
//! ([`iteration`]), the complexity assessment ([`complexity`]), the
//! verify-merge helper ([`verify`]) and the reviewer/judge skip policies
//! ([`skip`]).
//!
//! ## Persistence Ownership
//!
//! Several subsystems write durable state under the session directory, each
//! owning a distinct concern:
//!
//! | Layer              | What it persists                                  |
//! |--------------------|---------------------------------------------------|
//! | `task.rs`          | Task snapshot: phase, flags, iteration counters   |
//! | `handoff/store.rs` | Latest typed artifact per `{task, phase}`         |
//! | `memory/mod.rs`    | Typed feedback log feeding the next prompt        |
//! | `journal.rs`       | Append-only observable event trace                |
//!
//! The task snapshot is the source of truth for control flow; the journal
//! is an observation layer and never drives decisions.

mod complexity;
mod iteration;
mod sequencer;
mod skip;
mod verify;

pub use skip::{should_skip, SkipCondition};
pub use verify::MergeOutcome;

use crate::adapter::{run_one_shot, AdapterRegistry, AgentInvocation, AgentOutcome, RoleRouting};
use crate::auth::TokenRefresher;
use crate::config::Config;
use crate::errors::AgentError;
use crate::gateway::RepoGateway;
use crate::handoff::HandoffStore;
use crate::journal::Journal;
use crate::memory::MemoryStore;
use crate::pool::ContainerPool;
use crate::task::{Phase, Role, TaskState, TaskType};
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// How one phase ended, from the inner loop's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Judge ADVANCE, auto-advance, or budget exhaustion.
    Advanced { forced: bool },
    /// Task transitioned to BLOCKED; the phase loop stops.
    Blocked,
    /// Cancellation observed mid-phase; nothing advanced.
    Cancelled,
}

/// The controller owns all mutable session state: stores, adapters,
/// cancellation, and the global iteration budget. One value per session,
/// threaded explicitly; initialized at session start, torn down at exit.
pub struct Controller {
    pub(crate) config: Config,
    pub(crate) registry: AdapterRegistry,
    pub(crate) routing: RoleRouting,
    pub(crate) gateway: Arc<dyn RepoGateway>,
    pub(crate) refresher: Arc<dyn TokenRefresher>,
    pub(crate) handoff: HandoffStore,
    pub(crate) memory: MemoryStore,
    pub(crate) journal: Journal,
    pub(crate) cancel: CancellationToken,
    pub(crate) deadline: Instant,
    pub(crate) global_iteration: u32,
    pub(crate) ui: Option<Arc<crate::ui::SessionUi>>,
}

impl Controller {
    pub fn new(
        config: Config,
        registry: AdapterRegistry,
        routing: RoleRouting,
        gateway: Arc<dyn RepoGateway>,
        refresher: Arc<dyn TokenRefresher>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        config.ensure_directories()?;
        let handoff = HandoffStore::open(config.handoff_path())?;
        let memory = MemoryStore::open(
            config.memory_path(),
            config.settings.phase_loop.memory_max_entries,
        )?;
        let journal = Journal::new(config.journal_path());
        let deadline = Instant::now()
            + std::time::Duration::from_secs(config.settings.session.deadline_minutes * 60);

        Ok(Self {
            config,
            registry,
            routing,
            gateway,
            refresher,
            handoff,
            memory,
            journal,
            cancel,
            deadline,
            global_iteration: 0,
            ui: None,
        })
    }

    pub fn set_ui(&mut self, ui: Arc<crate::ui::SessionUi>) {
        self.ui = Some(ui);
    }

    /// New task positioned at the first configured phase.
    pub fn create_task(&self, id: &str, task_type: TaskType, repository: &str) -> TaskState {
        let mut task = TaskState::new(id, task_type, repository);
        if let Some(first) = self.config.settings.phase_order().first() {
            task.phase = *first;
            task.max_phase_iterations = self
                .config
                .settings
                .max_iterations_for(*first, task.workflow_path);
        }
        task
    }

    pub fn handoff(&self) -> &HandoffStore {
        &self.handoff
    }

    pub fn handoff_mut(&mut self) -> &mut HandoffStore {
        &mut self.handoff
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn global_iteration(&self) -> u32 {
        self.global_iteration
    }

    /// Run one agent turn for `role`, preferring the phase's container pool
    /// and falling back to one-shot host execution when the pool is absent
    /// or the role's container is unhealthy.
    pub(crate) async fn run_role_turn(
        &self,
        role: Role,
        task: &TaskState,
        prompt: String,
        pool: Option<&ContainerPool>,
    ) -> Result<AgentOutcome, AgentError> {
        let adapter = self.registry.for_role(&self.routing, role)?;
        if let Some(ui) = &self.ui {
            ui.turn(role.as_str(), task.phase_iteration);
        }
        let invocation = AgentInvocation {
            session_id: self.config.session_id.clone(),
            task_id: task.id.clone(),
            repository: task.repository.clone(),
            phase: task.phase,
            role,
            iteration: task.phase_iteration,
            prompt,
            workdir: self.config.project_dir.clone(),
        };

        let outcome = match pool {
            Some(pool) => match pool.exec(role, adapter.as_ref(), &invocation, &self.cancel).await {
                Ok(outcome) => Ok(outcome),
                Err(AgentError::Cancelled) => Err(AgentError::Cancelled),
                Err(err) => {
                    warn!(role = %role, error = %err, "pooled exec failed, falling back to one-shot");
                    run_one_shot(adapter.as_ref(), &invocation, &self.cancel).await
                }
            },
            None => run_one_shot(adapter.as_ref(), &invocation, &self.cancel).await,
        };

        if let Ok(outcome) = &outcome {
            self.capture_turn(task, role, outcome);
        }
        outcome
    }

    /// Raw output capture under `turns/` for operator debugging.
    fn capture_turn(&self, task: &TaskState, role: Role, outcome: &AgentOutcome) {
        let path = self
            .config
            .turn_capture_path(task.phase, task.phase_iteration, role);
        if let Err(e) = std::fs::write(&path, &outcome.raw_text) {
            warn!(path = %path.display(), error = %e, "failed to capture turn output");
        }
    }

    /// Start the per-phase container pool when container reuse is enabled.
    /// Any failure degrades to one-shot invocation for the phase.
    pub(crate) async fn start_pool(&self, phase: Phase) -> Option<ContainerPool> {
        if !self.config.settings.workflow.container_reuse {
            return None;
        }
        let docker = ContainerPool::connect().await?;

        let roles: Vec<(Role, Arc<dyn crate::adapter::AgentAdapter>)> =
            [Role::Worker, Role::Reviewer, Role::Judge]
                .into_iter()
                .filter_map(|role| {
                    self.registry
                        .for_role(&self.routing, role)
                        .ok()
                        .map(|adapter| (role, adapter))
                })
                .collect();

        let auth_mounts: Vec<(String, String)> = self
            .config
            .settings
            .container
            .auth_mounts
            .iter()
            .map(|(host, container)| (host.clone(), container.clone()))
            .collect();

        match ContainerPool::start(
            docker,
            &self.config.session_id,
            phase,
            &roles,
            &self.config.project_dir,
            &auth_mounts,
        )
        .await
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!(error = %e, "container pool start failed, using one-shot invocation");
                None
            }
        }
    }

    /// Best-effort comment on the task's PR when one exists, else the issue.
    pub(crate) async fn post_comment(&self, task: &TaskState, body: &str) {
        if body.trim().is_empty() {
            return;
        }
        let result = match task.pr_number {
            Some(pr) => self.gateway.comment_pr(&task.repository, pr, body).await,
            None => {
                let issue = task.id.parse().unwrap_or(0);
                self.gateway
                    .comment_issue(&task.repository, issue, body)
                    .await
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to post comment");
        }
    }

    /// Persist the stores; failures warn, the loop keeps going.
    pub(crate) fn persist_stores(&self, task: &TaskState) {
        if let Err(e) = self.handoff.save() {
            warn!(error = %e, "failed to persist handoff store");
        }
        if let Err(e) = self.memory.save() {
            warn!(error = %e, "failed to persist memory store");
        }
        if let Err(e) = task.save(&self.config.task_path()) {
            warn!(error = %e, "failed to persist task snapshot");
        }
    }
}
