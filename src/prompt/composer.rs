//! Builders for the three role prompts plus the complexity assessment.

use super::template::substitute;
use crate::agentium_config::AgentiumConfig;
use crate::handoff::{PlanOutput, PlanStep};
use crate::memory::{MemoryEntryType, MemoryStore};
use crate::signals::FeedbackResponse;
use crate::task::{Phase, TaskContext, TaskState};
use crate::util::truncate_tail;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Built-in template variables available to every prompt.
fn builtins(context: &TaskContext) -> HashMap<String, String> {
    HashMap::from([
        ("repository".to_string(), context.repository.clone()),
        ("issue_url".to_string(), context.issue_url.clone()),
        (
            "issue_number".to_string(),
            context.issue_number.to_string(),
        ),
    ])
}

/// Default worker instruction per phase, extended by any custom
/// `worker_prompt` from configuration.
fn phase_instruction(settings: &AgentiumConfig, phase: Phase) -> String {
    let base = match phase {
        Phase::Plan => {
            "Analyze the issue and produce an implementation plan. Read the relevant \
             code first. Do not modify any files in this phase."
        }
        Phase::Implement => {
            "Implement the plan. Create a work branch, make the changes, run the test \
             suite, and commit with clear messages."
        }
        Phase::Docs => {
            "Update any documentation affected by the change: README sections, doc \
             comments, usage examples. If nothing needs updating, say so."
        }
        Phase::Verify => {
            "Check the pull request's CI status. If all checks pass, merge it. \
             Otherwise report exactly which checks are failing."
        }
        _ => "",
    };
    match settings.phase_spec(phase).and_then(|s| s.worker_prompt.as_deref()) {
        Some(custom) => format!("{}\n\n{}", base, custom),
        None => base.to_string(),
    }
}

/// Narrative opener for retry iterations, keyed to phase.
fn retry_narrative(phase: Phase) -> &'static str {
    match phase {
        Phase::Plan => {
            "Your previous implementation plan was reviewed and sent back for another \
             pass. Revise it rather than starting from scratch."
        }
        Phase::Implement => {
            "Your previous implementation attempt was reviewed and needs more work. \
             Build on the existing branch; do not discard committed progress."
        }
        Phase::Docs => {
            "Your previous documentation pass was reviewed and needs adjustments."
        }
        Phase::Verify => {
            "The previous verification attempt did not reach a merge. Re-check the \
             failing items below."
        }
        _ => "The previous attempt needs another pass.",
    }
}

/// The handoff-signal template the worker must emit for each phase.
fn handoff_template(phase: Phase) -> &'static str {
    match phase {
        Phase::Plan => {
            r#"AGENTIUM_HANDOFF: {"summary": "<one-line plan summary>", "filesToModify": ["path"], "filesToCreate": ["path"], "implementationSteps": [{"order": 1, "description": "<step>", "file": "<path>"}], "testingApproach": "<how this will be tested>"}"#
        }
        Phase::Implement => {
            r#"AGENTIUM_HANDOFF: {"branchName": "<branch>", "commits": [{"hash": "<sha>", "message": "<message>"}], "filesChanged": ["path"], "testsPassed": true, "testOutput": "<trimmed test output>"}"#
        }
        Phase::Docs => {
            r#"AGENTIUM_HANDOFF: {"docsUpdated": ["path"], "readmeChanged": false}"#
        }
        Phase::Verify => {
            r#"AGENTIUM_HANDOFF: {"checksPassed": true, "mergeSuccessful": false, "mergeSha": null, "remainingFailures": []}"#
        }
        _ => "",
    }
}

/// Inputs for the worker prompt.
pub struct WorkerInput<'a> {
    pub settings: &'a AgentiumConfig,
    pub task: &'a TaskState,
    pub context: &'a TaskContext,
    pub memory: &'a MemoryStore,
    pub max_iterations: u32,
}

/// Compose the worker prompt for the current iteration.
///
/// Iteration 1 carries the issue body and the filtered prior discussion.
/// Later iterations lead with a retry narrative and the accumulated fix
/// list: judge directives first, reviewer analysis second.
pub fn worker_prompt(input: &WorkerInput) -> String {
    let task = input.task;
    let phase = task.phase;
    let mut sections: Vec<String> = Vec::new();

    sections.push(format!(
        "You are the WORKER agent resolving an issue in {{repository}}.\n\
         Active phase: {} (iteration {} of {}).",
        phase, task.phase_iteration, input.max_iterations
    ));

    if task.phase_iteration <= 1 {
        sections.push(format!(
            "## ISSUE #{{issue_number}}: {}\n\n{}",
            input.context.title, input.context.body
        ));
        if !input.context.discussion.is_empty() {
            let discussion = input
                .context
                .discussion
                .iter()
                .map(|c| format!("- {}", c))
                .collect::<Vec<_>>()
                .join("\n");
            sections.push(format!("## PRIOR DISCUSSION\n{}", discussion));
        }
    } else {
        sections.push(retry_narrative(phase).to_string());

        let feedback = input
            .memory
            .previous_iteration_feedback(&task.id, task.phase_iteration);
        let directives: Vec<String> = feedback
            .iter()
            .filter(|e| e.entry_type == MemoryEntryType::JudgeDirective)
            .map(|e| format!("- {}", e.content))
            .collect();
        let reviews: Vec<String> = feedback
            .iter()
            .filter(|e| e.entry_type == MemoryEntryType::EvalFeedback)
            .map(|e| format!("- {}", e.content))
            .collect();
        let mut fix_list = String::from("Here's what you need to fix:\n");
        fix_list.push_str(&directives.join("\n"));
        if !directives.is_empty() && !reviews.is_empty() {
            fix_list.push('\n');
        }
        fix_list.push_str(&reviews.join("\n"));
        sections.push(fix_list);

        sections.push(
            "For each feedback item above, state how you handled it, one per line:\n\
             AGENTIUM_MEMORY: FEEDBACK_RESPONSE <ADDRESSED|DECLINED|PARTIAL> <summary> - <response>"
                .to_string(),
        );
    }

    sections.push(format!(
        "## TASK\n{}",
        phase_instruction(input.settings, phase)
    ));

    sections.push(format!(
        "## REQUIRED HANDOFF\nWhen the phase work is complete, output exactly one line:\n{}",
        handoff_template(phase)
    ));

    substitute(
        &sections.join("\n\n"),
        &builtins(input.context),
        &input.settings.params,
    )
}

/// Inputs for the reviewer prompt.
pub struct ReviewerInput<'a> {
    pub settings: &'a AgentiumConfig,
    pub task: &'a TaskState,
    pub context: &'a TaskContext,
    pub phase_output: &'a str,
    /// Rendered prior-iteration feedback lines.
    pub previous_feedback: Vec<String>,
    /// Handoff summary, present only when produced by the current iteration.
    pub handoff_summary: Option<String>,
    pub feedback_responses: Vec<FeedbackResponse>,
}

pub fn reviewer_prompt(input: &ReviewerInput) -> String {
    let phase = input.task.phase;
    let mut sections: Vec<String> = Vec::new();

    sections.push(format!(
        "You are the REVIEWER for the {} phase of an automated workflow resolving \
         issue #{{issue_number}} in {{repository}}. Critique the worker's output \
         below; be specific about anything that must change.",
        phase
    ));

    sections.push(format!("## PHASE OUTPUT\n{}", input.phase_output));

    if !input.previous_feedback.is_empty() {
        sections.push(format!(
            "## PREVIOUS FEEDBACK\n{}",
            input
                .previous_feedback
                .iter()
                .map(|f| format!("- {}", f))
                .collect::<Vec<_>>()
                .join("\n")
        ));
    }

    if let Some(summary) = &input.handoff_summary {
        sections.push(format!("## WORKER HANDOFF\n{}", summary));
    }

    if !input.feedback_responses.is_empty() {
        sections.push(format!(
            "## WORKER RESPONSES TO FEEDBACK\n{}",
            input
                .feedback_responses
                .iter()
                .map(|r| format!("- {}", r))
                .collect::<Vec<_>>()
                .join("\n")
        ));
    }

    if let Some(custom) = input
        .settings
        .phase_spec(phase)
        .and_then(|s| s.reviewer_prompt.as_deref())
    {
        sections.push(custom.to_string());
    }

    sections.push(
        "End your review with exactly one line:\n\
         AGENTIUM_EVAL: ADVANCE|ITERATE|BLOCKED <your analysis>"
            .to_string(),
    );

    substitute(
        &sections.join("\n\n"),
        &builtins(input.context),
        &input.settings.params,
    )
}

/// Default judge criteria per phase.
fn judge_criteria(settings: &AgentiumConfig, phase: Phase) -> String {
    let base = match phase {
        Phase::Plan => {
            "ADVANCE only if the plan names concrete files and ordered steps and a \
             testing approach. ITERATE if it is vague or incomplete. BLOCKED only if \
             the issue cannot be planned without human input."
        }
        Phase::Implement => {
            "ADVANCE only if the change is complete and tests pass. ITERATE for \
             incomplete work or failing tests. BLOCKED if progress is impossible \
             without human input."
        }
        Phase::Docs => {
            "ADVANCE if documentation matches the change (including when no update \
             was needed). ITERATE if something user-facing is undocumented."
        }
        Phase::Verify => {
            "ADVANCE if checks pass or the merge happened. ITERATE while failures \
             remain fixable. BLOCKED if the PR cannot be merged without human input."
        }
        _ => "",
    };
    match settings.phase_spec(phase).and_then(|s| s.judge_criteria.as_deref()) {
        Some(custom) => format!("{}\n{}", base, custom),
        None => base.to_string(),
    }
}

/// Inputs for the judge prompt.
pub struct JudgeInput<'a> {
    pub settings: &'a AgentiumConfig,
    pub task: &'a TaskState,
    pub context: &'a TaskContext,
    pub phase_output: &'a str,
    pub reviewer_feedback: &'a str,
    /// Rendered prior judge directives (empty on iteration 1).
    pub prior_directives: String,
    pub is_final_iteration: bool,
}

pub fn judge_prompt(input: &JudgeInput) -> String {
    let phase = input.task.phase;
    let budget = input.settings.phase_loop.judge_context_budget;
    let mut sections: Vec<String> = Vec::new();

    sections.push(format!(
        "You are the JUDGE for the {} phase. Decide whether this iteration's work \
         is acceptable, weighing the reviewer's analysis against the phase output.",
        phase
    ));

    if !input.prior_directives.is_empty() {
        sections.push(format!(
            "## YOUR PRIOR DIRECTIVES\n{}",
            input.prior_directives
        ));
    }

    sections.push(format!(
        "## REVIEWER FEEDBACK\n{}",
        input.reviewer_feedback
    ));

    sections.push(format!(
        "## PHASE OUTPUT\n{}",
        truncate_tail(input.phase_output, budget)
    ));

    sections.push(format!(
        "## CRITERIA\n{}",
        judge_criteria(input.settings, phase)
    ));

    if input.is_final_iteration {
        sections.push(
            "This is the final iteration for this phase. Prefer ADVANCE unless a \
             critical problem remains."
                .to_string(),
        );
    }

    sections.push(
        "Respond with exactly one line:\n\
         AGENTIUM_EVAL: ADVANCE|ITERATE|BLOCKED <one-sentence reason>"
            .to_string(),
    );

    substitute(
        &sections.join("\n\n"),
        &builtins(input.context),
        &input.settings.params,
    )
}

/// Prompt for the single-shot complexity assessment after PLAN iteration 1.
pub fn complexity_prompt(settings: &AgentiumConfig, plan_output: &str) -> String {
    let budget = settings.phase_loop.judge_context_budget;
    format!(
        "Classify the complexity of the following implementation plan.\n\n\
         SIMPLE means a small, low-risk change: one or two files, no design \
         decisions, obvious testing. Everything else is COMPLEX.\n\n\
         ## PLAN\n{}\n\n\
         Respond with exactly one line:\n\
         AGENTIUM_EVAL: SIMPLE|COMPLEX <one-sentence reason>",
        truncate_tail(plan_output, budget)
    )
}

static HEADING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+(.+)$").unwrap());

static LIST_ITEM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:[-*]|\d+[.)])\s+(.+)$").unwrap());

/// Deterministically extract a [`PlanOutput`] from an issue body that
/// already contains plan-shaped sections.
///
/// Heuristic: markdown headings matching "Implementation", "Files to
/// modify/create", "Testing". Returns None unless an implementation section
/// with at least one step exists, in which case the PLAN worker turn is
/// skipped entirely for iteration 1.
pub fn extract_plan_from_issue(body: &str) -> Option<PlanOutput> {
    let mut sections: Vec<(String, String)> = Vec::new();
    let all: Vec<(usize, usize, String)> = HEADING_REGEX
        .captures_iter(body)
        .map(|cap| {
            let whole = cap.get(0).unwrap();
            let title = cap.get(1).unwrap().as_str().trim().to_lowercase();
            (whole.start(), whole.end(), title)
        })
        .collect();

    for (idx, (_, end, title)) in all.iter().enumerate() {
        let section_end = all
            .get(idx + 1)
            .map(|(next_start, _, _)| *next_start)
            .unwrap_or(body.len());
        sections.push((title.clone(), body[*end..section_end].to_string()));
    }

    let mut plan = PlanOutput::default();
    let mut found_steps = false;

    for (title, content) in &sections {
        let items: Vec<String> = LIST_ITEM_REGEX
            .captures_iter(content)
            .map(|cap| cap.get(1).unwrap().as_str().trim().to_string())
            .collect();

        if title.contains("implementation") || title.contains("plan") {
            for (i, item) in items.iter().enumerate() {
                plan.implementation_steps.push(PlanStep {
                    order: (i + 1) as u32,
                    description: item.clone(),
                    file: String::new(),
                });
            }
            found_steps = found_steps || !items.is_empty();
        } else if title.contains("files to create") {
            plan.files_to_create.extend(items);
        } else if title.contains("files to") {
            plan.files_to_modify.extend(items);
        } else if title.contains("testing") {
            plan.testing_approach = content.trim().to_string();
        }
    }

    if !found_steps {
        return None;
    }

    // Summary: the first non-empty line before any heading, else the first step.
    let prefix_end = all.first().map(|(start, _, _)| *start).unwrap_or(0);
    plan.summary = body[..prefix_end]
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| plan.implementation_steps[0].description.clone());

    Some(plan)
}
