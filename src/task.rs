//! Task state model for the phase loop.
//!
//! A task is one unit of autonomous work: a repository issue (or PR) driven
//! through the configured phases until a terminal phase is reached. The
//! state here is the single source of truth the sequencer reads and writes;
//! it is snapshotted to `task.json` on every transition so `agentium status`
//! and crash recovery see the latest picture.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Workflow phases, in their canonical order, plus the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Plan,
    Implement,
    Docs,
    Verify,
    Complete,
    Blocked,
    NothingToDo,
}

impl Phase {
    /// Terminal phases are fixed points: once set, the task never leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Blocked | Phase::NothingToDo)
    }

    /// Working phases run the inner iteration loop.
    pub fn is_working(&self) -> bool {
        !self.is_terminal()
    }

    /// Default iteration budget for the COMPLEX (default) workflow path.
    pub fn default_budget(&self) -> u32 {
        match self {
            Phase::Plan => 3,
            Phase::Implement => 5,
            Phase::Docs => 2,
            Phase::Verify => 3,
            _ => 1,
        }
    }

    /// Iteration budget under the SIMPLE workflow path.
    pub fn simple_budget(&self) -> u32 {
        match self {
            Phase::Plan => 1,
            Phase::Implement => 2,
            Phase::Docs => 1,
            Phase::Verify => 2,
            _ => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Plan => "PLAN",
            Phase::Implement => "IMPLEMENT",
            Phase::Docs => "DOCS",
            Phase::Verify => "VERIFY",
            Phase::Complete => "COMPLETE",
            Phase::Blocked => "BLOCKED",
            Phase::NothingToDo => "NOTHING_TO_DO",
        }
    }

    /// Lowercase form used in file names and container names.
    pub fn slug(&self) -> String {
        self.as_str().to_lowercase().replace('_', "-")
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "PLAN" => Ok(Phase::Plan),
            "IMPLEMENT" => Ok(Phase::Implement),
            "DOCS" => Ok(Phase::Docs),
            "VERIFY" => Ok(Phase::Verify),
            "COMPLETE" => Ok(Phase::Complete),
            "BLOCKED" => Ok(Phase::Blocked),
            "NOTHING_TO_DO" => Ok(Phase::NothingToDo),
            _ => anyhow::bail!(
                "Invalid phase '{}'. Valid values: PLAN, IMPLEMENT, DOCS, VERIFY",
                s
            ),
        }
    }
}

/// The three LLM roles invoked per iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Worker,
    Reviewer,
    Judge,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Worker => "worker",
            Role::Reviewer => "reviewer",
            Role::Judge => "judge",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Complexity classification that selects iteration budgets.
///
/// Set at most once per task, immediately after PLAN iteration 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowPath {
    #[default]
    Unset,
    Simple,
    Complex,
}

impl WorkflowPath {
    pub fn is_set(&self) -> bool {
        !matches!(self, WorkflowPath::Unset)
    }

    /// Budget for a phase under this path, before config overrides.
    pub fn budget_for(&self, phase: Phase) -> u32 {
        match self {
            WorkflowPath::Simple => phase.simple_budget(),
            _ => phase.default_budget(),
        }
    }
}

impl fmt::Display for WorkflowPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowPath::Unset => write!(f, "UNSET"),
            WorkflowPath::Simple => write!(f, "SIMPLE"),
            WorkflowPath::Complex => write!(f, "COMPLEX"),
        }
    }
}

/// What kind of repository object the task resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    #[default]
    Issue,
    Pr,
}

/// Immutable task context installed at phase-loop entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    pub title: String,
    pub body: String,
    pub repository: String,
    pub issue_number: u64,
    pub issue_url: String,
    /// Prior issue discussion, already filtered of the controller's own
    /// comments (identified by the signature footer).
    #[serde(default)]
    pub discussion: Vec<String>,
}

/// Mutable state for one active task. Lifetime = task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub id: String,
    pub task_type: TaskType,
    pub repository: String,
    pub phase: Phase,
    /// 1-based iteration counter within the current phase.
    pub phase_iteration: u32,
    pub max_phase_iterations: u32,
    pub workflow_path: WorkflowPath,
    #[serde(default)]
    pub parent_branch: String,
    #[serde(default)]
    pub pr_number: Option<u64>,
    #[serde(default)]
    pub draft_pr_created: bool,
    #[serde(default)]
    pub pr_merged: bool,
    #[serde(default)]
    pub last_judge_verdict: Option<String>,
    #[serde(default)]
    pub last_judge_feedback: Option<String>,
    /// Set when the controller force-advanced a phase without a judge
    /// ADVANCE. Marks the PR as requiring human review.
    #[serde(default)]
    pub controller_overrode: bool,
    /// Set when the judge said ADVANCE while the reviewer's own feedback
    /// parsed to ITERATE or BLOCKED. Also marks the PR for human review.
    #[serde(default)]
    pub judge_overrode_reviewer: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskState {
    pub fn new(id: &str, task_type: TaskType, repository: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            task_type,
            repository: repository.to_string(),
            phase: Phase::Plan,
            phase_iteration: 1,
            max_phase_iterations: Phase::Plan.default_budget(),
            workflow_path: WorkflowPath::Unset,
            parent_branch: String::new(),
            pr_number: None,
            draft_pr_created: false,
            pr_merged: false,
            last_judge_verdict: None,
            last_judge_feedback: None,
            controller_overrode: false,
            judge_overrode_reviewer: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether any NOMERGE flag is set, requiring human review before merge.
    pub fn requires_human_review(&self) -> bool {
        self.controller_overrode || self.judge_overrode_reviewer
    }

    /// Transition to a new phase, resetting the iteration counter.
    ///
    /// Terminal phases are fixed points: once the task is in COMPLETE,
    /// BLOCKED or NOTHING_TO_DO the transition is a no-op.
    pub fn transition_to(&mut self, phase: Phase) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = phase;
        self.phase_iteration = 1;
        self.updated_at = Utc::now();
    }

    /// Set the workflow path. At most once per task; later calls are no-ops.
    pub fn classify(&mut self, path: WorkflowPath) {
        if self.workflow_path.is_set() {
            return;
        }
        self.workflow_path = path;
        self.updated_at = Utc::now();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Snapshot to `path` atomically (write temp file, rename over).
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize task state")?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to rename into {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse task state")
    }
}
