//! Per-task iteration memory.
//!
//! An append-only log of typed entries that carries feedback between
//! iterations: reviewer notes (EVAL_FEEDBACK), judge directives
//! (JUDGE_DIRECTIVE), phase results (PHASE_RESULT) and the worker's own
//! responses to feedback (FEEDBACK_RESPONSE). EVAL_FEEDBACK describes only
//! the current attempt and is cleared on ADVANCE; the other types persist
//! for the life of the task. Ordering is stable (insertion order).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Entry categories. Only EVAL_FEEDBACK is attempt-scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryEntryType {
    EvalFeedback,
    JudgeDirective,
    PhaseResult,
    FeedbackResponse,
}

impl fmt::Display for MemoryEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemoryEntryType::EvalFeedback => "EVAL_FEEDBACK",
            MemoryEntryType::JudgeDirective => "JUDGE_DIRECTIVE",
            MemoryEntryType::PhaseResult => "PHASE_RESULT",
            MemoryEntryType::FeedbackResponse => "FEEDBACK_RESPONSE",
        };
        write!(f, "{}", s)
    }
}

/// One memory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub task_id: String,
    pub entry_type: MemoryEntryType,
    pub content: String,
    /// Global iteration counter at recording time.
    pub iteration: u32,
    /// 1-based iteration within the phase that recorded the entry.
    pub phase_iteration: u32,
    pub timestamp: DateTime<Utc>,
}

/// A pending entry for batch appends.
#[derive(Debug, Clone)]
pub struct MemoryUpdate {
    pub entry_type: MemoryEntryType,
    pub content: String,
}

impl MemoryUpdate {
    pub fn new(entry_type: MemoryEntryType, content: impl Into<String>) -> Self {
        Self {
            entry_type,
            content: content.into(),
        }
    }
}

/// Append-only entry log with retrieval helpers, persisted as JSON.
#[derive(Debug)]
pub struct MemoryStore {
    path: PathBuf,
    entries: Vec<MemoryEntry>,
    /// Oldest entries are dropped past this cap (0 = unbounded).
    max_entries: usize,
}

impl MemoryStore {
    pub fn open(path: PathBuf, max_entries: usize) -> Result<Self> {
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content).context("Failed to parse memory store")?
        } else {
            Vec::new()
        };
        Ok(Self {
            path,
            entries,
            max_entries,
        })
    }

    /// Append one entry.
    pub fn record(
        &mut self,
        task_id: &str,
        entry_type: MemoryEntryType,
        content: impl Into<String>,
        iteration: u32,
        phase_iteration: u32,
    ) {
        self.entries.push(MemoryEntry {
            task_id: task_id.to_string(),
            entry_type,
            content: content.into(),
            iteration,
            phase_iteration,
            timestamp: Utc::now(),
        });
        self.enforce_cap();
    }

    /// Batch append, preserving the given order.
    pub fn update(
        &mut self,
        updates: Vec<MemoryUpdate>,
        iteration: u32,
        phase_iteration: u32,
        task_id: &str,
    ) {
        for update in updates {
            self.record(
                task_id,
                update.entry_type,
                update.content,
                iteration,
                phase_iteration,
            );
        }
    }

    /// All EVAL_FEEDBACK and JUDGE_DIRECTIVE entries recorded at
    /// `phase_iteration - 1`, in insertion order. Iteration 1 has no
    /// previous attempt and gets nothing.
    pub fn previous_iteration_feedback(
        &self,
        task_id: &str,
        phase_iteration: u32,
    ) -> Vec<&MemoryEntry> {
        if phase_iteration <= 1 {
            return Vec::new();
        }
        let wanted = phase_iteration - 1;
        self.entries
            .iter()
            .filter(|e| {
                e.task_id == task_id
                    && e.phase_iteration == wanted
                    && matches!(
                        e.entry_type,
                        MemoryEntryType::EvalFeedback | MemoryEntryType::JudgeDirective
                    )
            })
            .collect()
    }

    /// Render all prior-iteration judge directives as a tagged bullet list
    /// for the next judge prompt. Empty string when there are none.
    pub fn judge_history_context(&self, task_id: &str, current_iteration: u32) -> String {
        let directives: Vec<&MemoryEntry> = self
            .entries
            .iter()
            .filter(|e| {
                e.task_id == task_id
                    && e.entry_type == MemoryEntryType::JudgeDirective
                    && e.phase_iteration < current_iteration
            })
            .collect();
        if directives.is_empty() {
            return String::new();
        }
        directives
            .iter()
            .map(|e| format!("- [iteration {}] {}", e.phase_iteration, e.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Remove every entry of `entry_type` for the task. Used to drop
    /// EVAL_FEEDBACK on ADVANCE so stale reviewer notes do not leak forward.
    pub fn clear_by_type(&mut self, task_id: &str, entry_type: MemoryEntryType) {
        self.entries
            .retain(|e| !(e.task_id == task_id && e.entry_type == entry_type));
    }

    pub fn entries_for(&self, task_id: &str) -> Vec<&MemoryEntry> {
        self.entries.iter().filter(|e| e.task_id == task_id).collect()
    }

    pub fn count_by_type(&self, task_id: &str, entry_type: MemoryEntryType) -> usize {
        self.entries
            .iter()
            .filter(|e| e.task_id == task_id && e.entry_type == entry_type)
            .count()
    }

    fn enforce_cap(&mut self) {
        if self.max_entries > 0 && self.entries.len() > self.max_entries {
            let excess = self.entries.len() - self.max_entries;
            self.entries.drain(0..excess);
        }
    }

    /// Atomic best-effort persistence.
    pub fn save(&self) -> Result<()> {
        let json =
            serde_json::to_string_pretty(&self.entries).context("Failed to serialize memory")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to rename into {}", self.path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        let dir = tempfile::tempdir().unwrap();
        // Keep the tempdir alive through the store's path.
        let path = dir.keep().join("memory.json");
        MemoryStore::open(path, 0).unwrap()
    }

    #[test]
    fn test_record_and_retrieve_in_order() {
        let mut mem = store();
        mem.record("42", MemoryEntryType::EvalFeedback, "first", 1, 1);
        mem.record("42", MemoryEntryType::JudgeDirective, "second", 1, 1);

        let entries = mem.entries_for("42");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].content, "first");
        assert_eq!(entries[1].content, "second");
    }

    #[test]
    fn test_previous_iteration_feedback_only_prior_attempt() {
        let mut mem = store();
        mem.record("42", MemoryEntryType::EvalFeedback, "iter1 note", 1, 1);
        mem.record("42", MemoryEntryType::JudgeDirective, "iter1 directive", 1, 1);
        mem.record("42", MemoryEntryType::EvalFeedback, "iter2 note", 2, 2);
        mem.record("42", MemoryEntryType::PhaseResult, "not feedback", 1, 1);

        let feedback = mem.previous_iteration_feedback("42", 2);
        let contents: Vec<&str> = feedback.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["iter1 note", "iter1 directive"]);

        // Iteration 1 has no previous attempt.
        assert!(mem.previous_iteration_feedback("42", 1).is_empty());
    }

    #[test]
    fn test_previous_iteration_feedback_scoped_to_task() {
        let mut mem = store();
        mem.record("42", MemoryEntryType::EvalFeedback, "mine", 1, 1);
        mem.record("99", MemoryEntryType::EvalFeedback, "other task", 1, 1);

        let feedback = mem.previous_iteration_feedback("42", 2);
        assert_eq!(feedback.len(), 1);
        assert_eq!(feedback[0].content, "mine");
    }

    #[test]
    fn test_judge_history_context_renders_bullets() {
        let mut mem = store();
        mem.record("42", MemoryEntryType::JudgeDirective, "tighten tests", 1, 1);
        mem.record("42", MemoryEntryType::JudgeDirective, "split the module", 2, 2);
        mem.record("42", MemoryEntryType::EvalFeedback, "reviewer note", 2, 2);

        let context = mem.judge_history_context("42", 3);
        assert!(context.contains("- [iteration 1] tighten tests"));
        assert!(context.contains("- [iteration 2] split the module"));
        assert!(!context.contains("reviewer note"));
    }

    #[test]
    fn test_judge_history_excludes_current_iteration() {
        let mut mem = store();
        mem.record("42", MemoryEntryType::JudgeDirective, "current", 2, 2);
        assert!(mem.judge_history_context("42", 2).is_empty());
    }

    #[test]
    fn test_clear_by_type_keeps_other_types() {
        let mut mem = store();
        mem.record("42", MemoryEntryType::EvalFeedback, "stale", 1, 1);
        mem.record("42", MemoryEntryType::JudgeDirective, "durable", 1, 1);
        mem.record("42", MemoryEntryType::PhaseResult, "record", 1, 1);

        mem.clear_by_type("42", MemoryEntryType::EvalFeedback);

        assert_eq!(mem.count_by_type("42", MemoryEntryType::EvalFeedback), 0);
        assert_eq!(mem.count_by_type("42", MemoryEntryType::JudgeDirective), 1);
        assert_eq!(mem.count_by_type("42", MemoryEntryType::PhaseResult), 1);
    }

    #[test]
    fn test_clear_by_type_scoped_to_task() {
        let mut mem = store();
        mem.record("42", MemoryEntryType::EvalFeedback, "mine", 1, 1);
        mem.record("99", MemoryEntryType::EvalFeedback, "other", 1, 1);

        mem.clear_by_type("42", MemoryEntryType::EvalFeedback);
        assert_eq!(mem.count_by_type("99", MemoryEntryType::EvalFeedback), 1);
    }

    #[test]
    fn test_batch_update_preserves_order() {
        let mut mem = store();
        mem.update(
            vec![
                MemoryUpdate::new(MemoryEntryType::EvalFeedback, "a"),
                MemoryUpdate::new(MemoryEntryType::JudgeDirective, "b"),
            ],
            3,
            2,
            "42",
        );
        let entries = mem.entries_for("42");
        assert_eq!(entries[0].content, "a");
        assert_eq!(entries[1].content, "b");
        assert_eq!(entries[0].iteration, 3);
        assert_eq!(entries[0].phase_iteration, 2);
    }

    #[test]
    fn test_entry_cap_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let mut mem = MemoryStore::open(dir.path().join("memory.json"), 2).unwrap();
        mem.record("42", MemoryEntryType::EvalFeedback, "one", 1, 1);
        mem.record("42", MemoryEntryType::EvalFeedback, "two", 2, 2);
        mem.record("42", MemoryEntryType::EvalFeedback, "three", 3, 3);

        let entries = mem.entries_for("42");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].content, "two");
        assert_eq!(entries[1].content, "three");
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");

        let mut mem = MemoryStore::open(path.clone(), 0).unwrap();
        mem.record("42", MemoryEntryType::PhaseResult, "PLAN advanced", 1, 1);
        mem.save().unwrap();

        let reopened = MemoryStore::open(path, 0).unwrap();
        assert_eq!(reopened.entries_for("42").len(), 1);
    }
}
