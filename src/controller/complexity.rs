//! Complexity assessment.
//!
//! Single-shot classifier run after the first PLAN worker iteration while
//! the task's workflow path is still UNSET. The judge-role adapter reads
//! the plan output (tail-truncated to the judge context budget) and emits
//! `AGENTIUM_EVAL: SIMPLE|COMPLEX`; anything unparseable fails closed to
//! COMPLEX. The chosen path selects iteration budgets for every remaining
//! phase of the task.

use super::Controller;
use crate::journal::Event;
use crate::prompt::complexity_prompt;
use crate::signals::{parse_path_verdict, PathVerdict};
use crate::task::{Role, TaskState};
use tracing::{info, warn};

impl Controller {
    pub(crate) async fn assess_complexity(
        &mut self,
        task: &TaskState,
        plan_output: &str,
        pool: Option<&crate::pool::ContainerPool>,
    ) -> PathVerdict {
        let prompt = complexity_prompt(&self.config.settings, plan_output);
        let verdict = match self.run_role_turn(Role::Judge, task, prompt, pool).await {
            Ok(outcome) if outcome.succeeded() => parse_path_verdict(&outcome.raw_text),
            Ok(outcome) => {
                warn!(
                    exit_code = outcome.exit_code,
                    "complexity assessor errored, failing closed to COMPLEX"
                );
                PathVerdict::fail_closed()
            }
            Err(err) => {
                warn!(error = %err, "complexity assessor failed, failing closed to COMPLEX");
                PathVerdict::fail_closed()
            }
        };

        info!(
            path = %verdict.path,
            signal_found = verdict.signal_found,
            reason = %verdict.feedback,
            "workflow path classified"
        );
        self.journal.append(
            &task.id,
            Event::WorkflowClassified {
                path: verdict.path.to_string(),
                signal_found: verdict.signal_found,
            },
        );
        verdict
    }
}
