//! The inner bounded iteration loop.
//!
//! At most `maxIter` iterations per phase, each running Worker → Reviewer →
//! Judge with the skip policies, auto-advance short-circuits, no-signal
//! tracking, the PLAN hard gate and override detection in between. The loop
//! fails closed on ambiguity (ITERATE) and fails open on judge errors
//! (ADVANCE), with the no-signal counter as the backstop against silently
//! broken judges.

use super::{Controller, PhaseOutcome};
use crate::adapter::AgentOutcome;
use crate::errors::{AgentError, PhaseLoopError};
use crate::gateway::DraftPrRequest;
use crate::handoff::{extract_handoff_payload, parse_phase_artifact, PhaseArtifact};
use crate::journal::Event;
use crate::memory::{MemoryEntryType, MemoryUpdate};
use crate::pool::ContainerPool;
use crate::prompt::{
    extract_plan_from_issue, judge_prompt, reviewer_prompt, worker_prompt, JudgeInput,
    ReviewerInput, WorkerInput,
};
use crate::signals::{
    parse_feedback_responses, parse_verdict, strip_signal_lines, Verdict, VerdictKind,
};
use crate::task::{Phase, Role, TaskContext, TaskState, WorkflowPath};
use tracing::{debug, info, warn};

impl Controller {
    /// Run the inner loop for the task's current phase.
    pub(crate) async fn run_phase(
        &mut self,
        task: &mut TaskState,
        mut max_iter: u32,
        pool: Option<&ContainerPool>,
    ) -> Result<PhaseOutcome, PhaseLoopError> {
        let phase = task.phase;
        let mut no_signal_count: u32 = 0;
        let mut iter: u32 = 0;

        while iter < max_iter {
            iter += 1;
            task.phase_iteration = iter;
            task.touch();

            if self.cancel.is_cancelled() {
                return Ok(PhaseOutcome::Cancelled);
            }

            // 1. Credential check; a failure blocks the task outright.
            if let Err(e) = self.refresher.ensure_fresh().await {
                warn!(error = %e, "token refresh failed, blocking task");
                task.transition_to(Phase::Blocked);
                self.persist_stores(task);
                return Err(PhaseLoopError::TokenRefresh(e.to_string()));
            }

            self.global_iteration += 1;
            let context = self.task_context(task);

            // 2+3. Worker turn and handoff parse (or deterministic plan
            // extraction replacing the worker turn).
            let (phase_output, worker_outcome) =
                match self.worker_turn(task, &context, iter, max_iter, pool).await? {
                    WorkerTurn::Output(output, outcome) => (output, outcome),
                    WorkerTurn::Errored => continue,
                    WorkerTurn::Cancelled => return Ok(PhaseOutcome::Cancelled),
                };

            // 4. Phase-specific auto-advance short-circuits.
            if phase == Phase::Docs && self.docs_unchanged(task, iter) {
                info!("no documentation changes, auto-advancing DOCS");
                self.advance_iteration(task, iter, "DOCS: no documentation changes needed", true);
                return Ok(PhaseOutcome::Advanced { forced: false });
            }
            if phase == Phase::Verify {
                let merge = self.verify_merge(task).await;
                if merge.merged {
                    task.pr_merged = true;
                    let note = format!(
                        "VERIFY: merged{}",
                        merge
                            .merge_sha
                            .as_deref()
                            .map(|sha| format!(" ({})", sha))
                            .unwrap_or_default()
                    );
                    self.advance_iteration(task, iter, &note, true);
                    return Ok(PhaseOutcome::Advanced { forced: false });
                }
                // VERIFY is mechanical: no Reviewer/Judge, just retry with
                // the failure list carried into the next worker prompt.
                let failures = if merge.remaining_failures.is_empty() {
                    "checks not yet green".to_string()
                } else {
                    merge.remaining_failures.join("; ")
                };
                let retry = format!("Merge not achieved: {}", failures);
                info!(iteration = iter, "{}", retry);
                self.memory.record(
                    &task.id,
                    MemoryEntryType::EvalFeedback,
                    &retry,
                    self.global_iteration,
                    iter,
                );
                self.post_comment(task, &retry).await;
                self.persist_stores(task);
                continue;
            }

            // 5. Post the worker's prose (signals stripped) as a comment.
            if let Some(outcome) = &worker_outcome {
                let text = if outcome.assistant_text.trim().is_empty() {
                    &outcome.raw_text
                } else {
                    &outcome.assistant_text
                };
                self.post_comment(task, &strip_signal_lines(text)).await;
            }

            // 6. Draft PR once commits exist.
            if phase == Phase::Implement && !task.draft_pr_created {
                self.maybe_create_draft_pr(task, &context).await;
            }

            // 7. Complexity assessment gate, exactly once per task.
            if phase == Phase::Plan && iter == 1 && task.workflow_path == WorkflowPath::Unset {
                let verdict = self.assess_complexity(task, &phase_output, pool).await;
                task.classify(verdict.path);
                if task.workflow_path == WorkflowPath::Simple {
                    self.advance_iteration(
                        task,
                        iter,
                        "PLAN: simple task, auto-advancing without review",
                        verdict.signal_found,
                    );
                    return Ok(PhaseOutcome::Advanced { forced: false });
                }
                // COMPLEX: the budget may differ from the pre-classification
                // default, recompute now.
                max_iter = self
                    .config
                    .settings
                    .max_iterations_for(phase, task.workflow_path);
                task.max_phase_iterations = max_iter;
            }

            // 8. Skip policies, evaluated for each role independently.
            let zero_code_changes = self.zero_code_changes(task, iter);
            let no_signal_limit = self.config.settings.phase_loop.judge_no_signal_limit;
            let (reviewer_skip, judge_skip) = {
                let loop_cfg = &self.config.settings.phase_loop;
                (
                    super::should_skip(
                        loop_cfg.reviewer_skip,
                        &loop_cfg.reviewer_skip_on,
                        &phase_output,
                        zero_code_changes,
                    ),
                    super::should_skip(
                        loop_cfg.judge_skip,
                        &loop_cfg.judge_skip_on,
                        &phase_output,
                        zero_code_changes,
                    ),
                )
            };
            if let Some(reason) = &reviewer_skip {
                self.journal.append(
                    &task.id,
                    Event::RoleSkipped {
                        phase: phase.to_string(),
                        iteration: iter,
                        role: Role::Reviewer.to_string(),
                        reason: reason.clone(),
                    },
                );
            }
            if let Some(reason) = &judge_skip {
                self.journal.append(
                    &task.id,
                    Event::RoleSkipped {
                        phase: phase.to_string(),
                        iteration: iter,
                        role: Role::Judge.to_string(),
                        reason: reason.clone(),
                    },
                );
            }

            // 9. Reviewer turn.
            let mut reviewer_verdict: Option<Verdict> = None;
            let mut reviewer_feedback = String::new();
            if reviewer_skip.is_none() {
                match self
                    .reviewer_turn(task, &context, &phase_output, iter, pool)
                    .await
                {
                    ReviewerTurn::Feedback(text, verdict) => {
                        reviewer_feedback = text;
                        reviewer_verdict = Some(verdict);
                    }
                    ReviewerTurn::Errored => {
                        // Reviewer failure is fail-open: advance with a note.
                        warn!("reviewer turn failed, treating as ADVANCE");
                        self.advance_iteration(
                            task,
                            iter,
                            &format!("{}: advanced after reviewer failure", phase),
                            false,
                        );
                        return Ok(PhaseOutcome::Advanced { forced: false });
                    }
                    ReviewerTurn::Cancelled => return Ok(PhaseOutcome::Cancelled),
                }
            }

            // A skipped judge is an auto-advance for the iteration.
            if let Some(reason) = judge_skip {
                self.advance_iteration(
                    task,
                    iter,
                    &format!("{}: auto-advanced (judge skipped: {})", phase, reason),
                    true,
                );
                return Ok(PhaseOutcome::Advanced { forced: false });
            }

            // 10. Judge turn. Hard failures fail open to ADVANCE; the
            // no-signal counter below catches silently-wrong judges.
            let judge_result = self
                .judge_turn(task, &context, &phase_output, &reviewer_feedback, iter, max_iter, pool)
                .await;
            let mut verdict = match judge_result {
                JudgeTurn::Verdict(verdict) => verdict,
                JudgeTurn::Errored => {
                    warn!("judge turn failed, treating as ADVANCE");
                    self.advance_iteration(
                        task,
                        iter,
                        &format!("{}: advanced after judge failure", phase),
                        false,
                    );
                    return Ok(PhaseOutcome::Advanced { forced: false });
                }
                JudgeTurn::Cancelled => return Ok(PhaseOutcome::Cancelled),
            };

            task.last_judge_verdict = Some(verdict.kind.to_string());
            task.last_judge_feedback = Some(verdict.feedback.clone());

            // 11. No-signal tracking with forced ADVANCE at the limit.
            let mut force_advanced = false;
            if verdict.signal_found {
                no_signal_count = 0;
            } else {
                no_signal_count += 1;
                self.journal.append(
                    &task.id,
                    Event::NoSignal {
                        phase: phase.to_string(),
                        iteration: iter,
                        count: no_signal_count,
                    },
                );
                if no_signal_count >= no_signal_limit {
                    info!(
                        limit = no_signal_limit,
                        "judge no-signal limit reached, forcing ADVANCE"
                    );
                    verdict = Verdict {
                        kind: VerdictKind::Advance,
                        feedback: "no parseable judge verdict; forcing ADVANCE".to_string(),
                        signal_found: false,
                    };
                    force_advanced = true;
                }
            }

            // 12. PLAN hard gate: no advancing out of PLAN without a valid
            // stored plan. signal_found stays true so the override persists
            // without tripping the no-signal counter.
            if !force_advanced
                && phase == Phase::Plan
                && verdict.kind == VerdictKind::Advance
                && !self.has_valid_plan(task)
            {
                info!("judge said ADVANCE but no plan handoff stored, overriding to ITERATE");
                verdict = Verdict::found(
                    VerdictKind::Iterate,
                    "No structured plan was handed off. End your next turn with the \
                     AGENTIUM_HANDOFF line carrying the plan payload.",
                );
            }

            // 13. Judge-overrode-reviewer detection (NOMERGE marker). A
            // forced advance is the controller's doing, not the judge's.
            if !force_advanced && verdict.kind == VerdictKind::Advance {
                if let Some(reviewer) = &reviewer_verdict {
                    if reviewer.signal_found
                        && matches!(reviewer.kind, VerdictKind::Iterate | VerdictKind::Blocked)
                    {
                        warn!(
                            reviewer = %reviewer.kind,
                            "judge advanced against the reviewer's verdict"
                        );
                        task.judge_overrode_reviewer = true;
                    }
                }
            }

            self.journal.append(
                &task.id,
                Event::VerdictApplied {
                    phase: phase.to_string(),
                    iteration: iter,
                    verdict: verdict.kind.to_string(),
                    signal_found: verdict.signal_found,
                },
            );
            if let Some(ui) = &self.ui {
                ui.verdict(&verdict.to_string());
            }

            // 14. Apply.
            match verdict.kind {
                VerdictKind::Advance => {
                    self.memory
                        .clear_by_type(&task.id, MemoryEntryType::EvalFeedback);
                    self.memory.record(
                        &task.id,
                        MemoryEntryType::PhaseResult,
                        format!("{} advanced at iteration {}: {}", phase, iter, verdict.feedback),
                        self.global_iteration,
                        iter,
                    );
                    self.persist_stores(task);
                    return Ok(PhaseOutcome::Advanced { forced: false });
                }
                VerdictKind::Iterate => {
                    if verdict.signal_found && !verdict.feedback.is_empty() {
                        self.memory.record(
                            &task.id,
                            MemoryEntryType::JudgeDirective,
                            verdict.feedback.clone(),
                            self.global_iteration,
                            iter,
                        );
                    }
                    self.persist_stores(task);
                    debug!(iteration = iter, "iterating");
                }
                VerdictKind::Blocked => {
                    task.transition_to(Phase::Blocked);
                    self.memory.record(
                        &task.id,
                        MemoryEntryType::PhaseResult,
                        format!("{} blocked at iteration {}: {}", phase, iter, verdict.feedback),
                        self.global_iteration,
                        iter,
                    );
                    self.persist_stores(task);
                    return Ok(PhaseOutcome::Blocked);
                }
            }
        }

        // Budget exhausted without an ADVANCE.
        self.memory
            .clear_by_type(&task.id, MemoryEntryType::EvalFeedback);
        let note = match phase {
            Phase::Docs => {
                info!("DOCS budget exhausted, advancing (non-blocking)");
                format!("DOCS exhausted {} iterations; advancing", max_iter)
            }
            Phase::Verify => {
                warn!("VERIFY budget exhausted without merge; PR left for manual review");
                format!("VERIFY exhausted {} iterations without merge", max_iter)
            }
            _ => {
                warn!(%phase, "budget exhausted, force-advancing with NOMERGE marker");
                task.controller_overrode = true;
                format!("{} exhausted {} iterations; controller force-advanced", phase, max_iter)
            }
        };
        self.memory.record(
            &task.id,
            MemoryEntryType::PhaseResult,
            note,
            self.global_iteration,
            max_iter,
        );
        self.persist_stores(task);
        Ok(PhaseOutcome::Advanced { forced: true })
    }

    /// Issue context for prompts, minimally synthesized when the gateway
    /// fetch never populated one.
    fn task_context(&self, task: &TaskState) -> TaskContext {
        self.handoff
            .issue_context(&task.id)
            .cloned()
            .unwrap_or_else(|| TaskContext {
                repository: task.repository.clone(),
                issue_number: task.id.parse().unwrap_or(0),
                ..Default::default()
            })
    }

    async fn worker_turn(
        &mut self,
        task: &TaskState,
        context: &TaskContext,
        iter: u32,
        max_iter: u32,
        pool: Option<&ContainerPool>,
    ) -> Result<WorkerTurn, PhaseLoopError> {
        let phase = task.phase;

        // PLAN-skip heuristic: a plan-shaped issue body replaces the worker.
        if phase == Phase::Plan
            && iter == 1
            && self.config.settings.phase_loop.skip_plan_if_exists
        {
            if let Some(plan) = extract_plan_from_issue(&context.body) {
                info!("issue body already contains a plan, skipping PLAN worker turn");
                let artifact = PhaseArtifact::Plan(plan);
                let output = artifact.summary_text();
                self.store_artifact(task, iter, artifact);
                return Ok(WorkerTurn::Output(output, None));
            }
        }

        let prompt = worker_prompt(&WorkerInput {
            settings: &self.config.settings,
            task,
            context,
            memory: &self.memory,
            max_iterations: max_iter,
        });

        let outcome = match self.run_role_turn(Role::Worker, task, prompt, pool).await {
            Ok(outcome) => outcome,
            Err(AgentError::Cancelled) => return Ok(WorkerTurn::Cancelled),
            Err(err) => {
                warn!(error = %err, iteration = iter, "worker turn failed, consuming iteration");
                return Ok(WorkerTurn::Errored);
            }
        };
        if !outcome.succeeded() {
            warn!(
                exit_code = outcome.exit_code,
                iteration = iter,
                "worker exited with error, consuming iteration"
            );
            return Ok(WorkerTurn::Errored);
        }

        let phase_output = outcome.raw_text.clone();

        // Record the worker's responses to prior feedback.
        let responses = parse_feedback_responses(&phase_output);
        if !responses.is_empty() {
            let updates = responses
                .iter()
                .map(|r| MemoryUpdate::new(MemoryEntryType::FeedbackResponse, r.to_string()))
                .collect();
            self.memory
                .update(updates, self.global_iteration, iter, &task.id);
        }

        // Handoff parse: validation failures warn, parse failures warn,
        // neither fails the phase.
        if let Some(payload) = extract_handoff_payload(&phase_output) {
            match parse_phase_artifact(phase, &payload) {
                Ok(artifact) => {
                    if let Err(reason) = artifact.validate() {
                        warn!(%reason, "handoff artifact failed validation");
                    }
                    self.store_artifact(task, iter, artifact);
                }
                Err(e) => warn!(error = %e, "handoff payload did not parse, storing nothing"),
            }
        }

        Ok(WorkerTurn::Output(phase_output, Some(outcome)))
    }

    fn store_artifact(&mut self, task: &TaskState, iter: u32, artifact: PhaseArtifact) {
        self.handoff
            .store_phase_output(&task.id, task.phase, iter, artifact);
        if let Err(e) = self.handoff.save() {
            warn!(error = %e, "failed to persist handoff store");
        }
    }

    async fn reviewer_turn(
        &mut self,
        task: &TaskState,
        context: &TaskContext,
        phase_output: &str,
        iter: u32,
        pool: Option<&ContainerPool>,
    ) -> ReviewerTurn {
        let previous_feedback: Vec<String> = self
            .memory
            .previous_iteration_feedback(&task.id, iter)
            .iter()
            .map(|e| e.content.clone())
            .collect();
        // Stale (older-iteration) handoffs are never shown to the reviewer.
        let handoff_summary = self
            .handoff
            .get_current_output(&task.id, task.phase, iter)
            .map(|stored| stored.artifact.summary_text());
        let feedback_responses = parse_feedback_responses(phase_output);

        let prompt = reviewer_prompt(&ReviewerInput {
            settings: &self.config.settings,
            task,
            context,
            phase_output,
            previous_feedback,
            handoff_summary,
            feedback_responses,
        });

        let outcome = match self.run_role_turn(Role::Reviewer, task, prompt, pool).await {
            Ok(outcome) if outcome.succeeded() => outcome,
            Err(AgentError::Cancelled) => return ReviewerTurn::Cancelled,
            Ok(_) | Err(_) => return ReviewerTurn::Errored,
        };

        let verdict = parse_verdict(&outcome.raw_text, VerdictKind::Iterate);
        let feedback = {
            let stripped = strip_signal_lines(&outcome.raw_text);
            if stripped.is_empty() {
                verdict.feedback.clone()
            } else {
                stripped
            }
        };

        self.memory.record(
            &task.id,
            MemoryEntryType::EvalFeedback,
            &feedback,
            self.global_iteration,
            iter,
        );
        self.post_comment(task, &feedback).await;

        ReviewerTurn::Feedback(feedback, verdict)
    }

    async fn judge_turn(
        &mut self,
        task: &TaskState,
        context: &TaskContext,
        phase_output: &str,
        reviewer_feedback: &str,
        iter: u32,
        max_iter: u32,
        pool: Option<&ContainerPool>,
    ) -> JudgeTurn {
        let prior_directives = self.memory.judge_history_context(&task.id, iter);
        let prompt = judge_prompt(&JudgeInput {
            settings: &self.config.settings,
            task,
            context,
            phase_output,
            reviewer_feedback,
            prior_directives,
            is_final_iteration: iter >= max_iter,
        });

        match self.run_role_turn(Role::Judge, task, prompt, pool).await {
            Ok(outcome) if outcome.succeeded() => {
                JudgeTurn::Verdict(parse_verdict(&outcome.raw_text, VerdictKind::Iterate))
            }
            Err(AgentError::Cancelled) => JudgeTurn::Cancelled,
            Ok(_) | Err(_) => JudgeTurn::Errored,
        }
    }

    /// Auto-advance bookkeeping shared by the short-circuit paths: clear
    /// attempt-scoped feedback, record the phase result, journal the verdict.
    fn advance_iteration(&mut self, task: &TaskState, iter: u32, note: &str, signal_found: bool) {
        self.memory
            .clear_by_type(&task.id, MemoryEntryType::EvalFeedback);
        self.memory.record(
            &task.id,
            MemoryEntryType::PhaseResult,
            note,
            self.global_iteration,
            iter,
        );
        self.journal.append(
            &task.id,
            Event::VerdictApplied {
                phase: task.phase.to_string(),
                iteration: iter,
                verdict: VerdictKind::Advance.to_string(),
                signal_found,
            },
        );
        self.persist_stores(task);
    }

    fn docs_unchanged(&self, task: &TaskState, iter: u32) -> bool {
        self.handoff
            .get_current_output(&task.id, Phase::Docs, iter)
            .is_some_and(|stored| match &stored.artifact {
                PhaseArtifact::Docs(docs) => docs.docs_updated.is_empty() && !docs.readme_changed,
                _ => false,
            })
    }

    fn zero_code_changes(&self, task: &TaskState, iter: u32) -> bool {
        task.phase == Phase::Implement
            && self
                .handoff
                .get_current_output(&task.id, Phase::Implement, iter)
                .is_some_and(|stored| match &stored.artifact {
                    PhaseArtifact::Implement(implement) => implement.files_changed.is_empty(),
                    _ => false,
                })
    }

    fn has_valid_plan(&self, task: &TaskState) -> bool {
        self.handoff
            .get_phase_output(&task.id, Phase::Plan)
            .is_some_and(|stored| {
                matches!(stored.artifact, PhaseArtifact::Plan(_))
                    && stored.artifact.validate().is_ok()
            })
    }

    async fn maybe_create_draft_pr(&mut self, task: &mut TaskState, context: &TaskContext) {
        let Some(stored) = self.handoff.get_phase_output(&task.id, Phase::Implement) else {
            return;
        };
        let PhaseArtifact::Implement(implement) = &stored.artifact else {
            return;
        };
        if implement.commits.is_empty() {
            return;
        }

        let plan_summary = self
            .handoff
            .get_phase_output(&task.id, Phase::Plan)
            .map(|stored| stored.artifact.summary_text())
            .unwrap_or_default();
        let request = DraftPrRequest {
            title: format!("Fix #{}: {}", context.issue_number, context.title),
            body: format!("Resolves #{}.\n\n{}", context.issue_number, plan_summary),
            head_branch: implement.branch_name.clone(),
            base_branch: if task.parent_branch.is_empty() {
                "main".to_string()
            } else {
                task.parent_branch.clone()
            },
        };

        match self.gateway.create_draft_pr(&task.repository, &request).await {
            Ok(number) => {
                info!(pr_number = number, "draft PR created");
                task.pr_number = Some(number);
                task.draft_pr_created = true;
            }
            Err(e) => warn!(error = %e, "draft PR creation failed"),
        }
    }
}

enum WorkerTurn {
    /// Phase output plus the agent outcome (None when the worker turn was
    /// replaced by deterministic plan extraction).
    Output(String, Option<AgentOutcome>),
    Errored,
    Cancelled,
}

enum ReviewerTurn {
    Feedback(String, Verdict),
    Errored,
    Cancelled,
}

enum JudgeTurn {
    Verdict(Verdict),
    Errored,
    Cancelled,
}
