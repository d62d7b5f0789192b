//! Typed handoff artifacts, one variant per working phase.
//!
//! Field names follow the wire payload (camelCase JSON emitted by the
//! worker), which is part of the stable signal grammar.

use crate::task::Phase;
use serde::{Deserialize, Serialize};

/// One step of an implementation plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    #[serde(default)]
    pub order: u32,
    pub description: String,
    #[serde(default)]
    pub file: String,
}

/// PLAN phase output: what will be changed and how.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOutput {
    pub summary: String,
    #[serde(default)]
    pub files_to_modify: Vec<String>,
    #[serde(default)]
    pub files_to_create: Vec<String>,
    #[serde(default)]
    pub implementation_steps: Vec<PlanStep>,
    #[serde(default)]
    pub testing_approach: String,
}

/// A commit recorded by the IMPLEMENT worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    #[serde(default)]
    pub hash: String,
    pub message: String,
}

/// IMPLEMENT phase output: the branch and what landed on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplementOutput {
    pub branch_name: String,
    #[serde(default)]
    pub commits: Vec<Commit>,
    #[serde(default)]
    pub files_changed: Vec<String>,
    #[serde(default)]
    pub tests_passed: bool,
    #[serde(default)]
    pub test_output: String,
}

/// DOCS phase output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocsOutput {
    #[serde(default)]
    pub docs_updated: Vec<String>,
    #[serde(default)]
    pub readme_changed: bool,
}

/// VERIFY phase output: CI/merge status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutput {
    #[serde(default)]
    pub checks_passed: bool,
    #[serde(default)]
    pub merge_successful: bool,
    #[serde(default)]
    pub merge_sha: Option<String>,
    #[serde(default)]
    pub remaining_failures: Vec<String>,
}

/// A handoff artifact, discriminated by the phase that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase")]
pub enum PhaseArtifact {
    #[serde(rename = "PLAN")]
    Plan(PlanOutput),
    #[serde(rename = "IMPLEMENT")]
    Implement(ImplementOutput),
    #[serde(rename = "DOCS")]
    Docs(DocsOutput),
    #[serde(rename = "VERIFY")]
    Verify(VerifyOutput),
}

impl PhaseArtifact {
    /// The phase this artifact belongs to.
    pub fn phase(&self) -> Phase {
        match self {
            PhaseArtifact::Plan(_) => Phase::Plan,
            PhaseArtifact::Implement(_) => Phase::Implement,
            PhaseArtifact::Docs(_) => Phase::Docs,
            PhaseArtifact::Verify(_) => Phase::Verify,
        }
    }

    /// Phase-specific validation. Failures are warnings, never blockers:
    /// the artifact is still stored, but callers that need a *valid* plan
    /// (the PLAN hard gate) check this.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            PhaseArtifact::Plan(plan) => {
                if plan.summary.trim().is_empty() {
                    return Err("plan summary is empty".to_string());
                }
                Ok(())
            }
            PhaseArtifact::Implement(implement) => {
                if implement.branch_name.trim().is_empty() {
                    return Err("implement output has no branch name".to_string());
                }
                Ok(())
            }
            PhaseArtifact::Docs(_) => Ok(()),
            PhaseArtifact::Verify(verify) => {
                if verify.merge_successful && verify.merge_sha.is_none() {
                    return Err("merge reported successful without a merge SHA".to_string());
                }
                Ok(())
            }
        }
    }

    /// Short human-readable rendering for the reviewer prompt.
    pub fn summary_text(&self) -> String {
        match self {
            PhaseArtifact::Plan(plan) => format!(
                "Plan: {} ({} steps, {} files to modify, {} to create)",
                plan.summary,
                plan.implementation_steps.len(),
                plan.files_to_modify.len(),
                plan.files_to_create.len()
            ),
            PhaseArtifact::Implement(implement) => format!(
                "Implementation on branch {}: {} commit(s), {} file(s) changed, tests {}",
                implement.branch_name,
                implement.commits.len(),
                implement.files_changed.len(),
                if implement.tests_passed {
                    "passing"
                } else {
                    "not passing"
                }
            ),
            PhaseArtifact::Docs(docs) => format!(
                "Docs: {} file(s) updated, README {}",
                docs.docs_updated.len(),
                if docs.readme_changed {
                    "changed"
                } else {
                    "unchanged"
                }
            ),
            PhaseArtifact::Verify(verify) => format!(
                "Verify: checks {}, merge {}{}",
                if verify.checks_passed { "passed" } else { "failing" },
                if verify.merge_successful {
                    "done"
                } else {
                    "not done"
                },
                verify
                    .merge_sha
                    .as_deref()
                    .map(|sha| format!(" ({})", sha))
                    .unwrap_or_default()
            ),
        }
    }
}
