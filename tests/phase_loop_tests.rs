//! Phase loop scenario tests.
//!
//! These drive the full controller with a scripted in-process adapter (one
//! queued output per agent turn, consumed in call order) and a recording
//! gateway, so every scenario runs the real sequencer, iteration loop,
//! stores and journal without touching Docker or the network.

use agentium::adapter::{
    AdapterRegistry, AgentAdapter, AgentInvocation, AgentOutcome, RoleRouting,
};
use agentium::agentium_config::AgentiumConfig;
use agentium::auth::{NoopRefresher, TokenRefresher};
use agentium::config::Config;
use agentium::controller::Controller;
use agentium::errors::PhaseLoopError;
use agentium::gateway::{DraftPrRequest, IssueDetails, RepoGateway};
use agentium::journal::Event;
use agentium::memory::MemoryEntryType;
use agentium::task::{Phase, Role, TaskContext, TaskState, TaskType, WorkflowPath};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Test doubles
// =============================================================================

/// One recorded agent turn: which role ran, in which phase, with what prompt.
#[derive(Debug, Clone)]
struct Turn {
    role: Role,
    phase: Phase,
    prompt: String,
}

/// Adapter that pops scripted outputs in call order. The subprocess behind
/// it is `cat`, which swallows the prompt and exits 0; the scripted text is
/// substituted in `parse_output`.
struct ScriptedAdapter {
    outputs: Mutex<VecDeque<String>>,
    turns: Mutex<Vec<Turn>>,
}

impl ScriptedAdapter {
    fn new(outputs: &[&str]) -> Self {
        Self {
            outputs: Mutex::new(outputs.iter().map(|s| s.to_string()).collect()),
            turns: Mutex::new(Vec::new()),
        }
    }

    fn turns(&self) -> Vec<Turn> {
        self.turns.lock().unwrap().clone()
    }

    fn turns_for(&self, phase: Phase, role: Role) -> Vec<Turn> {
        self.turns()
            .into_iter()
            .filter(|t| t.phase == phase && t.role == role)
            .collect()
    }
}

impl AgentAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted"
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
        self.turns.lock().unwrap().push(Turn {
            role: invocation.role,
            phase: invocation.phase,
            prompt: invocation.prompt.clone(),
        });
        Some(invocation.prompt.clone())
    }
    fn parse_output(&self, exit_code: i32, _: &str, _: &str) -> AgentOutcome {
        let text = self
            .outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        AgentOutcome {
            raw_text: text.clone(),
            assistant_text: text,
            summary: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            exit_code,
            agent_status: Some("success".to_string()),
        }
    }
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Gateway that records every call and answers from canned values.
#[derive(Default)]
struct RecordingGateway {
    issue_comments: Mutex<Vec<String>>,
    pr_comments: Mutex<Vec<String>>,
    created_prs: Mutex<Vec<DraftPrRequest>>,
    readied: Mutex<Vec<u64>>,
    merged: Mutex<Vec<u64>>,
}

#[async_trait]
impl RepoGateway for RecordingGateway {
    async fn fetch_issue(&self, _: &str, number: u64) -> Result<IssueDetails> {
        Ok(IssueDetails {
            number,
            ..Default::default()
        })
    }
    async fn comment_issue(&self, _: &str, _: u64, body: &str) -> Result<()> {
        self.issue_comments.lock().unwrap().push(body.to_string());
        Ok(())
    }
    async fn comment_pr(&self, _: &str, _: u64, body: &str) -> Result<()> {
        self.pr_comments.lock().unwrap().push(body.to_string());
        Ok(())
    }
    async fn create_draft_pr(&self, _: &str, request: &DraftPrRequest) -> Result<u64> {
        self.created_prs.lock().unwrap().push(request.clone());
        Ok(101)
    }
    async fn mark_pr_ready(&self, _: &str, number: u64) -> Result<()> {
        self.readied.lock().unwrap().push(number);
        Ok(())
    }
    async fn merge_pr(&self, _: &str, number: u64) -> Result<Option<String>> {
        self.merged.lock().unwrap().push(number);
        Ok(Some("controller-sha".to_string()))
    }
    async fn finalize_pr(&self, repository: &str, number: u64) -> Result<()> {
        self.mark_pr_ready(repository, number).await
    }
}

/// Refresher that always reports stale credentials.
struct FailingRefresher;

#[async_trait]
impl TokenRefresher for FailingRefresher {
    async fn ensure_fresh(&self) -> Result<()> {
        anyhow::bail!("token expired")
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    _dir: TempDir,
    controller: Controller,
    adapter: Arc<ScriptedAdapter>,
    gateway: Arc<RecordingGateway>,
    task: TaskState,
}

fn harness_with(
    outputs: &[&str],
    mutate: impl FnOnce(&mut AgentiumConfig),
    refresher: Arc<dyn TokenRefresher>,
    cancel: CancellationToken,
) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = Config::new(
        PathBuf::from(dir.path()),
        None,
        Some("feedcafe12345678".to_string()),
        false,
    )
    .unwrap();
    mutate(&mut config.settings);

    let adapter = Arc::new(ScriptedAdapter::new(outputs));
    let mut registry = AdapterRegistry::new();
    registry.register(adapter.clone()).unwrap();
    let routing = RoleRouting::uniform("scripted");
    let gateway = Arc::new(RecordingGateway::default());

    let controller = Controller::new(
        config,
        registry,
        routing,
        gateway.clone(),
        refresher,
        cancel,
    )
    .unwrap();

    let task = controller.create_task("42", TaskType::Issue, "octo/widgets");
    Harness {
        _dir: dir,
        controller,
        adapter,
        gateway,
        task,
    }
}

fn harness(outputs: &[&str], mutate: impl FnOnce(&mut AgentiumConfig)) -> Harness {
    harness_with(outputs, mutate, Arc::new(NoopRefresher), CancellationToken::new())
}

impl Harness {
    fn install_context(&mut self) {
        let id = self.task.id.clone();
        self.controller.handoff_mut().set_issue_context(
            &id,
            TaskContext {
                title: "Widget wobbles".to_string(),
                body: "The widget wobbles under load.".to_string(),
                repository: "octo/widgets".to_string(),
                issue_number: 42,
                issue_url: "https://github.com/octo/widgets/issues/42".to_string(),
                discussion: vec![],
            },
        );
    }

    async fn run(&mut self) -> Result<(), PhaseLoopError> {
        self.install_context();
        let mut task = self.task.clone();
        let result = self.controller.run_task(&mut task).await;
        self.task = task;
        result
    }

    fn events(&self) -> Vec<Event> {
        self.controller
            .journal()
            .read_all()
            .into_iter()
            .map(|r| r.event)
            .collect()
    }
}

const PLAN_HANDOFF: &str = concat!(
    "I read the physics module; damping fixes the wobble.\n",
    r#"AGENTIUM_HANDOFF: {"summary": "add damping to the widget update loop", "filesToModify": ["src/physics.rs"], "filesToCreate": [], "implementationSteps": [{"order": 1, "description": "add damping constant", "file": "src/physics.rs"}, {"order": 2, "description": "apply in update loop", "file": "src/physics.rs"}], "testingApproach": "unit tests on the damped step"}"#,
);

const IMPLEMENT_HANDOFF: &str = concat!(
    "Implemented damping on a work branch; tests pass.\n",
    r#"AGENTIUM_HANDOFF: {"branchName": "agentium/issue-42", "commits": [{"hash": "abc1234", "message": "add damping"}], "filesChanged": ["src/physics.rs"], "testsPassed": true, "testOutput": "2 passed"}"#,
);

const ADVANCE: &str = "AGENTIUM_EVAL: ADVANCE looks solid";

// =============================================================================
// Scenarios (spec-level behaviors)
// =============================================================================

/// Scenario 1: a SIMPLE classification auto-advances PLAN without review
/// and shrinks every later budget.
#[tokio::test]
async fn simple_auto_advance_skips_plan_review_and_shrinks_budgets() {
    let mut h = harness(
        &[
            PLAN_HANDOFF,
            "AGENTIUM_EVAL: SIMPLE quick fix",
            IMPLEMENT_HANDOFF,
            ADVANCE, // implement reviewer
            ADVANCE, // implement judge
        ],
        |_| {},
    );
    h.run().await.unwrap();

    assert_eq!(h.task.workflow_path, WorkflowPath::Simple);
    assert_eq!(h.task.phase, Phase::Complete);

    // No reviewer turn for PLAN; the only PLAN judge-role turn is the
    // complexity assessment.
    assert!(h.adapter.turns_for(Phase::Plan, Role::Reviewer).is_empty());
    let plan_judge = h.adapter.turns_for(Phase::Plan, Role::Judge);
    assert_eq!(plan_judge.len(), 1);
    assert!(plan_judge[0].prompt.contains("Classify the complexity"));

    // IMPLEMENT ran with the SIMPLE budget.
    assert!(h.events().iter().any(|e| matches!(
        e,
        Event::PhaseStarted { phase, max_iterations: 2 } if phase == "IMPLEMENT"
    )));

    // COMPLETE with a PR and no NOMERGE flags marks it ready for review.
    assert_eq!(h.task.pr_number, Some(101));
    assert_eq!(*h.gateway.readied.lock().unwrap(), vec![101]);
}

/// Scenario 2: judge ADVANCE without a stored plan is overridden to
/// ITERATE, demanding the handoff, without touching the no-signal counter.
#[tokio::test]
async fn plan_hard_gate_overrides_advance_until_handoff_exists() {
    let mut h = harness(
        &[
            "A fine plan in prose only, no structured handoff here.",
            "AGENTIUM_EVAL: COMPLEX touches the physics engine",
            "AGENTIUM_EVAL: ADVANCE reads well", // reviewer iter 1
            "AGENTIUM_EVAL: ADVANCE ship it",    // judge iter 1 -> overridden
            PLAN_HANDOFF,                        // worker iter 2
            ADVANCE,                             // reviewer iter 2
            ADVANCE,                             // judge iter 2
            IMPLEMENT_HANDOFF,
            ADVANCE,
            ADVANCE,
        ],
        |_| {},
    );
    h.run().await.unwrap();

    assert_eq!(h.task.phase, Phase::Complete);

    let events = h.events();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::VerdictApplied { phase, iteration: 1, verdict, signal_found: true }
            if phase == "PLAN" && verdict == "ITERATE"
    )));
    // The override carries signal_found=true, so no no-signal events exist.
    assert!(!events.iter().any(|e| matches!(e, Event::NoSignal { .. })));

    // The overriding directive reaches the next worker prompt.
    let plan_workers = h.adapter.turns_for(Phase::Plan, Role::Worker);
    assert_eq!(plan_workers.len(), 2);
    assert!(plan_workers[1].prompt.contains("No structured plan"));
    assert!(plan_workers[1].prompt.contains("Here's what you need to fix"));
}

/// Scenario 3: two consecutive judge turns without a parseable verdict
/// force an ADVANCE with signal_found=false; no NOMERGE marker is set.
#[tokio::test]
async fn judge_no_signal_exhaustion_forces_advance() {
    let mut h = harness(
        &[
            PLAN_HANDOFF,
            "AGENTIUM_EVAL: COMPLEX nontrivial",
            "Commentary without any verdict line.", // reviewer iter 1
            "Still thinking about it.",             // judge iter 1, no signal
            "Refined the plan further.",            // worker iter 2
            "More commentary.",                     // reviewer iter 2
            "No verdict again.",                    // judge iter 2, no signal
            IMPLEMENT_HANDOFF,
            ADVANCE,
            ADVANCE,
        ],
        |_| {},
    );
    h.run().await.unwrap();

    assert_eq!(h.task.phase, Phase::Complete);
    assert!(!h.task.controller_overrode);
    assert!(!h.task.judge_overrode_reviewer);

    let events = h.events();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::NoSignal { iteration: 1, count: 1, .. }
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::NoSignal { iteration: 2, count: 2, .. }
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::VerdictApplied { phase, iteration: 2, verdict, signal_found: false }
            if phase == "PLAN" && verdict == "ADVANCE"
    )));
}

/// Scenario 4: the judge advancing against the reviewer's ITERATE sets the
/// NOMERGE marker and the finished PR gets a NOMERGE comment, not a
/// ready-for-review flip.
#[tokio::test]
async fn judge_overriding_reviewer_marks_pr_nomerge() {
    let mut h = harness(
        &[
            PLAN_HANDOFF,
            "AGENTIUM_EVAL: COMPLEX cross-module",
            "AGENTIUM_EVAL: ITERATE the plan is too thin", // reviewer
            "AGENTIUM_EVAL: ADVANCE good enough",          // judge overrides
            IMPLEMENT_HANDOFF,
            ADVANCE,
            ADVANCE,
        ],
        |_| {},
    );
    h.run().await.unwrap();

    assert_eq!(h.task.phase, Phase::Complete);
    assert!(h.task.judge_overrode_reviewer);
    assert!(h.task.requires_human_review());

    let pr_comments = h.gateway.pr_comments.lock().unwrap().clone();
    assert!(
        pr_comments.iter().any(|c| c.starts_with("NOMERGE")),
        "expected a NOMERGE comment, got {:?}",
        pr_comments
    );
    assert!(h.gateway.readied.lock().unwrap().is_empty());
}

/// Scenario 5: a VERIFY handoff reporting a successful merge advances
/// without Reviewer/Judge and without the controller merging anything.
#[tokio::test]
async fn verify_merge_success_via_handoff_auto_advances() {
    let mut h = harness(
        &[
            PLAN_HANDOFF,
            "AGENTIUM_EVAL: SIMPLE small fix",
            IMPLEMENT_HANDOFF,
            ADVANCE,
            ADVANCE,
            concat!(
                "All checks green; merged the PR myself.\n",
                r#"AGENTIUM_HANDOFF: {"checksPassed": true, "mergeSuccessful": true, "mergeSha": "abc123", "remainingFailures": []}"#,
            ),
        ],
        |settings| settings.workflow.auto_merge = true,
    );
    h.run().await.unwrap();

    assert_eq!(h.task.phase, Phase::Complete);
    assert!(h.task.pr_merged);

    // Reviewer/Judge never ran for VERIFY, and the controller itself did
    // not invoke the merge operation.
    assert!(h.adapter.turns_for(Phase::Verify, Role::Reviewer).is_empty());
    assert!(h.adapter.turns_for(Phase::Verify, Role::Judge).is_empty());
    assert!(h.gateway.merged.lock().unwrap().is_empty());

    assert!(h.events().iter().any(|e| matches!(
        e,
        Event::MergeAttempt { pr_number: 101, merged: true }
    )));
}

/// Scenario 6: a DOCS handoff showing no changes auto-advances with a
/// recorded phase result and no review cycle.
#[tokio::test]
async fn docs_no_change_auto_advances() {
    let mut h = harness(
        &[
            PLAN_HANDOFF,
            "AGENTIUM_EVAL: SIMPLE doc-only check",
            IMPLEMENT_HANDOFF,
            ADVANCE,
            ADVANCE,
            concat!(
                "Nothing to update.\n",
                r#"AGENTIUM_HANDOFF: {"docsUpdated": [], "readmeChanged": false}"#,
            ),
        ],
        |settings| settings.workflow.docs = true,
    );
    h.run().await.unwrap();

    assert_eq!(h.task.phase, Phase::Complete);
    assert!(h.adapter.turns_for(Phase::Docs, Role::Reviewer).is_empty());
    assert!(h.adapter.turns_for(Phase::Docs, Role::Judge).is_empty());

    let id = h.task.id.clone();
    let results: Vec<String> = h
        .controller
        .memory()
        .entries_for(&id)
        .into_iter()
        .filter(|e| e.entry_type == MemoryEntryType::PhaseResult)
        .map(|e| e.content.clone())
        .collect();
    assert!(results.iter().any(|r| r.contains("no documentation changes")));
}

// =============================================================================
// Invariants and failure paths
// =============================================================================

/// After any ADVANCE the memory store holds no EVAL_FEEDBACK entries.
#[tokio::test]
async fn advance_clears_eval_feedback() {
    let mut h = harness(
        &[
            PLAN_HANDOFF,
            "AGENTIUM_EVAL: COMPLEX worth reviewing",
            "AGENTIUM_EVAL: ITERATE name the test files", // reviewer 1
            "AGENTIUM_EVAL: ITERATE add the test plan",   // judge 1
            PLAN_HANDOFF,                                 // worker 2
            ADVANCE,                                      // reviewer 2
            ADVANCE,                                      // judge 2
            IMPLEMENT_HANDOFF,
            ADVANCE,
            ADVANCE,
        ],
        |_| {},
    );
    h.run().await.unwrap();

    assert_eq!(h.task.phase, Phase::Complete);
    assert_eq!(
        h.controller
            .memory()
            .count_by_type(&h.task.id, MemoryEntryType::EvalFeedback),
        0
    );
    // Durable types survive.
    assert!(
        h.controller
            .memory()
            .count_by_type(&h.task.id, MemoryEntryType::PhaseResult)
            >= 2
    );
}

/// The iteration-2 worker prompt carries iteration-1 feedback, judge
/// directive first.
#[tokio::test]
async fn retry_prompt_carries_previous_iteration_feedback() {
    let mut h = harness(
        &[
            PLAN_HANDOFF,
            "AGENTIUM_EVAL: COMPLEX lots of surface",
            "AGENTIUM_EVAL: ITERATE step two is vague", // reviewer 1
            "AGENTIUM_EVAL: ITERATE spell out testing", // judge 1
            PLAN_HANDOFF,
            ADVANCE,
            ADVANCE,
            IMPLEMENT_HANDOFF,
            ADVANCE,
            ADVANCE,
        ],
        |_| {},
    );
    h.run().await.unwrap();

    let plan_workers = h.adapter.turns_for(Phase::Plan, Role::Worker);
    assert_eq!(plan_workers.len(), 2);
    let retry = &plan_workers[1].prompt;
    let directive_pos = retry.find("spell out testing").expect("judge directive");
    let review_pos = retry.find("step two is vague").expect("reviewer note");
    assert!(directive_pos < review_pos);
}

/// Budget exhaustion on IMPLEMENT force-advances and sets the NOMERGE
/// marker, leaving the PR in draft with a NOMERGE comment.
#[tokio::test]
async fn implement_exhaustion_sets_controller_override() {
    let mut h = harness(
        &[
            IMPLEMENT_HANDOFF,
            "AGENTIUM_EVAL: ITERATE tests are missing", // reviewer
            "AGENTIUM_EVAL: ITERATE agreed",            // judge
        ],
        |settings| {
            settings.phases.push(agentium::agentium_config::PhaseSpec {
                name: "IMPLEMENT".to_string(),
                max_iterations: Some(1),
                ..Default::default()
            });
        },
    );
    h.run().await.unwrap();

    assert_eq!(h.task.phase, Phase::Complete);
    assert!(h.task.controller_overrode);
    let pr_comments = h.gateway.pr_comments.lock().unwrap().clone();
    assert!(pr_comments.iter().any(|c| c.starts_with("NOMERGE")));
    assert!(h.gateway.readied.lock().unwrap().is_empty());
}

/// A VERIFY phase with the NOMERGE marker set completes without a merge
/// attempt.
#[tokio::test]
async fn verify_precheck_skips_merge_when_human_review_required() {
    let mut h = harness(
        &[
            IMPLEMENT_HANDOFF,
            "AGENTIUM_EVAL: ITERATE incomplete",
            "AGENTIUM_EVAL: ITERATE incomplete",
        ],
        |settings| {
            settings.workflow.auto_merge = true;
            settings.phases.push(agentium::agentium_config::PhaseSpec {
                name: "IMPLEMENT".to_string(),
                max_iterations: Some(1),
                ..Default::default()
            });
        },
    );
    h.run().await.unwrap();

    // Exhaustion set controller_overrode; VERIFY pre-check completed the
    // task without ever attempting a merge.
    assert_eq!(h.task.phase, Phase::Complete);
    assert!(h.task.controller_overrode);
    assert!(!h.task.pr_merged);
    assert!(h.gateway.merged.lock().unwrap().is_empty());
    assert!(h.adapter.turns_for(Phase::Verify, Role::Worker).is_empty());
}

/// Token refresh failure blocks the task and surfaces as an error.
#[tokio::test]
async fn token_refresh_failure_blocks_task() {
    let mut h = harness_with(
        &[PLAN_HANDOFF],
        |_| {},
        Arc::new(FailingRefresher),
        CancellationToken::new(),
    );
    let err = h.run().await.unwrap_err();
    assert!(matches!(err, PhaseLoopError::TokenRefresh(_)));
    assert_eq!(h.task.phase, Phase::Blocked);
    assert!(h.adapter.turns().is_empty());
}

/// A pre-cancelled session returns Cancelled without advancing anything.
#[tokio::test]
async fn cancellation_returns_without_phase_advance() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut h = harness_with(&[PLAN_HANDOFF], |_| {}, Arc::new(NoopRefresher), cancel);
    let err = h.run().await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(h.task.phase, Phase::Plan);
    assert_eq!(h.controller.global_iteration(), 0);
}

/// The global iteration budget stops the session between phases, leaving
/// the task parked in its current (non-terminal) phase.
#[tokio::test]
async fn global_iteration_budget_parks_task() {
    let mut h = harness(
        &[PLAN_HANDOFF, "AGENTIUM_EVAL: SIMPLE tiny"],
        |settings| settings.session.max_global_iterations = 1,
    );
    h.run().await.unwrap();

    assert_eq!(h.task.phase, Phase::Implement);
    assert!(h.adapter.turns_for(Phase::Implement, Role::Worker).is_empty());
}

/// skip_plan_if_exists extracts the plan from a plan-shaped issue body and
/// never runs the PLAN worker.
#[tokio::test]
async fn plan_skip_extracts_plan_from_issue_body() {
    let mut h = harness(
        &[
            "AGENTIUM_EVAL: SIMPLE plan was pre-written",
            IMPLEMENT_HANDOFF,
            ADVANCE,
            ADVANCE,
        ],
        |settings| settings.phase_loop.skip_plan_if_exists = true,
    );
    let id = h.task.id.clone();
    h.controller.handoff_mut().set_issue_context(
        &id,
        TaskContext {
            title: "Widget wobbles".to_string(),
            body: "Damping fix.\n\n## Implementation\n1. add damping\n2. apply in loop\n\n## Files to modify\n- src/physics.rs\n"
                .to_string(),
            repository: "octo/widgets".to_string(),
            issue_number: 42,
            issue_url: String::new(),
            discussion: vec![],
        },
    );
    let mut task = h.task.clone();
    h.controller.run_task(&mut task).await.unwrap();
    h.task = task;

    assert_eq!(h.task.phase, Phase::Complete);
    assert!(h.adapter.turns_for(Phase::Plan, Role::Worker).is_empty());
    // The extracted plan satisfied the hard gate and fed the assessor.
    let plan_judge = h.adapter.turns_for(Phase::Plan, Role::Judge);
    assert_eq!(plan_judge.len(), 1);
}

/// Reviewer skip conditions bypass the reviewer; judge skip auto-advances.
#[tokio::test]
async fn skip_policies_bypass_roles() {
    let mut h = harness(
        &[
            PLAN_HANDOFF,
            "AGENTIUM_EVAL: COMPLEX still complex",
            // No reviewer output: reviewer skipped on simple_output (the
            // plan handoff is fewer than 10 non-empty lines). Judge skip
            // then auto-advances without a judge turn.
            IMPLEMENT_HANDOFF,
            ADVANCE,
            ADVANCE,
        ],
        |settings| {
            settings.phase_loop.reviewer_skip_on = vec!["simple_output".to_string()];
            settings.phase_loop.judge_skip_on = vec!["simple_output".to_string()];
        },
    );
    h.run().await.unwrap();

    assert_eq!(h.task.phase, Phase::Complete);
    assert!(h.adapter.turns_for(Phase::Plan, Role::Reviewer).is_empty());
    // Only the assessor judge turn ran for PLAN.
    assert_eq!(h.adapter.turns_for(Phase::Plan, Role::Judge).len(), 1);

    let events = h.events();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::RoleSkipped { role, .. } if role == "reviewer"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::RoleSkipped { role, .. } if role == "judge"
    )));
}

/// A worker comment is posted with all signal lines stripped.
#[tokio::test]
async fn worker_comments_are_posted_signal_free() {
    let mut h = harness(
        &[
            PLAN_HANDOFF,
            "AGENTIUM_EVAL: SIMPLE trivial",
            IMPLEMENT_HANDOFF,
            ADVANCE,
            ADVANCE,
        ],
        |_| {},
    );
    h.run().await.unwrap();

    let comments = h.gateway.issue_comments.lock().unwrap().clone();
    assert!(!comments.is_empty());
    for comment in &comments {
        assert!(
            !comment.contains("AGENTIUM_"),
            "signal leaked into comment: {}",
            comment
        );
    }
}
