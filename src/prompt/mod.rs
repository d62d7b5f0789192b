//! Role prompt composition.
//!
//! Builds the Worker, Reviewer and Judge prompts from task context, the
//! memory store, the handoff store and phase configuration. Every composed
//! prompt goes through a template substitution pass with built-in variables
//! (`repository`, `issue_url`, `issue_number`) where user-provided
//! parameters win on key collision.

mod composer;
mod template;

pub use composer::{
    complexity_prompt, extract_plan_from_issue, judge_prompt, reviewer_prompt, worker_prompt,
    JudgeInput, ReviewerInput, WorkerInput,
};
pub use template::substitute;
