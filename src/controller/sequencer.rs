//! The outer phase loop.
//!
//! Sequences the configured phases for one task, handling terminal states,
//! the global termination predicate, VERIFY pre-checks and the per-phase
//! container pool lifecycle. Terminal handling runs *before* the global
//! predicate so a COMPLETE task always gets its PR finalized even when the
//! session is out of budget.

use super::{Controller, PhaseOutcome};
use crate::errors::PhaseLoopError;
use crate::journal::Event;
use crate::task::{Phase, TaskState};
use std::time::Instant;
use tracing::{info, warn};

impl Controller {
    /// Drive `task` through the configured phases until it reaches a
    /// terminal phase, the global termination predicate fires, or the
    /// session is cancelled.
    pub async fn run_task(&mut self, task: &mut TaskState) -> Result<(), PhaseLoopError> {
        let order = self.config.settings.phase_order();

        loop {
            // Terminal phases are handled before anything else. Finalizing
            // the PR must precede the global limit check so an exhausted
            // session cannot exit with the PR stuck in draft.
            if task.phase.is_terminal() {
                if task.phase == Phase::Complete && task.pr_number.is_some() {
                    self.finalize_pr(task).await;
                }
                self.journal.append(
                    &task.id,
                    Event::TaskTerminal {
                        phase: task.phase.to_string(),
                    },
                );
                self.persist_stores(task);
                info!(phase = %task.phase, "task reached terminal phase");
                return Ok(());
            }

            if self.should_terminate() {
                info!(
                    global_iteration = self.global_iteration,
                    "global termination predicate hit, leaving task in place"
                );
                self.persist_stores(task);
                return Ok(());
            }

            if self.cancel.is_cancelled() {
                return Err(PhaseLoopError::Cancelled);
            }

            // VERIFY pre-checks: nothing to merge, or a NOMERGE flag means
            // the merge is a human's call.
            if task.phase == Phase::Verify {
                if task.pr_number.is_none() {
                    info!("VERIFY with no PR, completing task");
                    task.transition_to(Phase::Complete);
                    continue;
                }
                if task.requires_human_review() {
                    info!("NOMERGE flag set, completing without merge attempt");
                    task.transition_to(Phase::Complete);
                    continue;
                }
            }

            let max_iter = self
                .config
                .settings
                .max_iterations_for(task.phase, task.workflow_path);
            task.max_phase_iterations = max_iter;
            self.journal.append(
                &task.id,
                Event::PhaseStarted {
                    phase: task.phase.to_string(),
                    max_iterations: max_iter,
                },
            );
            info!(phase = %task.phase, max_iter, "phase started");
            if let Some(ui) = &self.ui {
                ui.phase_started(task.phase.as_str(), max_iter);
            }

            let pool = self.start_pool(task.phase).await;
            let outcome = self.run_phase(task, max_iter, pool.as_ref()).await;
            if let Some(pool) = &pool {
                pool.stop_all().await;
            }

            match outcome? {
                PhaseOutcome::Advanced { forced } => {
                    let from = task.phase;
                    let next = next_phase(&order, from);
                    if let Some(ui) = &self.ui {
                        ui.phase_done(from.as_str());
                    }
                    self.journal.append(
                        &task.id,
                        Event::PhaseAdvanced {
                            from: from.to_string(),
                            to: next.to_string(),
                            forced,
                        },
                    );
                    task.transition_to(next);
                    self.persist_stores(task);
                }
                PhaseOutcome::Blocked => {
                    // Task is already in BLOCKED; the next pass through the
                    // loop handles the terminal state.
                    continue;
                }
                PhaseOutcome::Cancelled => {
                    return Err(PhaseLoopError::Cancelled);
                }
            }
        }
    }

    /// Global termination predicate: session iteration budget and
    /// wall-clock deadline. Cancellation is checked separately so it can
    /// surface as a distinct error.
    pub(crate) fn should_terminate(&self) -> bool {
        if self.global_iteration >= self.config.settings.session.max_global_iterations {
            return true;
        }
        Instant::now() >= self.deadline
    }

    /// Final disposition of the PR at COMPLETE: a NOMERGE comment when any
    /// override flag requires human review, otherwise mark ready-for-review
    /// (unless it already merged). Best-effort.
    pub(crate) async fn finalize_pr(&self, task: &TaskState) {
        let Some(pr_number) = task.pr_number else {
            return;
        };

        if task.requires_human_review() {
            let mut reasons = Vec::new();
            if task.controller_overrode {
                reasons.push("the controller force-advanced a phase without judge approval");
            }
            if task.judge_overrode_reviewer {
                reasons.push("the judge advanced against the reviewer's verdict");
            }
            let body = format!(
                "NOMERGE: human review required before merging — {}.",
                reasons.join("; ")
            );
            if let Err(e) = self
                .gateway
                .comment_pr(&task.repository, pr_number, &body)
                .await
            {
                warn!(error = %e, "failed to post NOMERGE comment");
            }
            return;
        }

        if task.pr_merged {
            return;
        }

        if let Err(e) = self.gateway.finalize_pr(&task.repository, pr_number).await {
            warn!(error = %e, "failed to finalize PR");
        }
    }
}

/// The phase after `current` in the configured order, or COMPLETE when
/// `current` is last (or not part of the order at all).
fn next_phase(order: &[Phase], current: Phase) -> Phase {
    order
        .iter()
        .position(|p| *p == current)
        .and_then(|idx| order.get(idx + 1))
        .copied()
        .unwrap_or(Phase::Complete)
}
