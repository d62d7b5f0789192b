//! Verify-merge helper.
//!
//! Two-path merge attempt driven by the current iteration's `VerifyOutput`:
//! the worker may have merged the PR itself, or it may report green checks
//! and leave the merge to the controller. With no artifact at all the
//! controller attempts the merge directly and lets the host's branch
//! protection gate it.

use super::Controller;
use crate::handoff::PhaseArtifact;
use crate::journal::Event;
use crate::task::{Phase, TaskState};
use tracing::{info, warn};

/// Result of one merge attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub merged: bool,
    pub merge_sha: Option<String>,
    /// Failing checks to surface in the next iteration's retry feedback.
    pub remaining_failures: Vec<String>,
}

impl Controller {
    /// Attempt to get the task's PR merged for the current VERIFY iteration.
    pub(crate) async fn verify_merge(&self, task: &TaskState) -> MergeOutcome {
        let Some(pr_number) = task.pr_number else {
            return MergeOutcome::default();
        };

        let current = self
            .handoff
            .get_current_output(&task.id, Phase::Verify, task.phase_iteration)
            .and_then(|stored| match &stored.artifact {
                PhaseArtifact::Verify(output) => Some(output.clone()),
                _ => None,
            });

        let outcome = match current {
            // Worker already merged.
            Some(output) if output.merge_successful => MergeOutcome {
                merged: true,
                merge_sha: output.merge_sha.clone(),
                remaining_failures: Vec::new(),
            },
            // Checks are green; the controller merges.
            Some(output) if output.checks_passed => {
                self.controller_merge(task, pr_number).await
            }
            // Red checks: no merge, carry the failures forward.
            Some(output) => MergeOutcome {
                merged: false,
                merge_sha: None,
                remaining_failures: output.remaining_failures.clone(),
            },
            // No artifact: try directly, branch protection will gate it.
            None => self.controller_merge(task, pr_number).await,
        };

        self.journal.append(
            &task.id,
            Event::MergeAttempt {
                pr_number,
                merged: outcome.merged,
            },
        );
        outcome
    }

    async fn controller_merge(&self, task: &TaskState, pr_number: u64) -> MergeOutcome {
        match self.gateway.merge_pr(&task.repository, pr_number).await {
            Ok(sha) => {
                info!(pr_number, sha = ?sha, "merged pull request");
                MergeOutcome {
                    merged: true,
                    merge_sha: sha,
                    remaining_failures: Vec::new(),
                }
            }
            Err(e) => {
                warn!(pr_number, error = %e, "merge attempt failed");
                MergeOutcome {
                    merged: false,
                    merge_sha: None,
                    remaining_failures: vec![format!("merge failed: {}", e)],
                }
            }
        }
    }
}
