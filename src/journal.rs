//! Append-only event journal.
//!
//! One JSON object per line in `events.jsonl` under the session directory:
//! phase transitions, verdicts, skips, force-advances and merge attempts.
//! This is the observable trace `agentium status` and the tests read.
//! Appends are best-effort; a failed write warns and the loop continues.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    PhaseStarted {
        phase: String,
        max_iterations: u32,
    },
    PhaseAdvanced {
        from: String,
        to: String,
        forced: bool,
    },
    VerdictApplied {
        phase: String,
        iteration: u32,
        verdict: String,
        signal_found: bool,
    },
    RoleSkipped {
        phase: String,
        iteration: u32,
        role: String,
        reason: String,
    },
    WorkflowClassified {
        path: String,
        signal_found: bool,
    },
    NoSignal {
        phase: String,
        iteration: u32,
        count: u32,
    },
    MergeAttempt {
        pr_number: u64,
        merged: bool,
    },
    TaskTerminal {
        phase: String,
    },
}

/// A journal record: the event plus when it happened and for which task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord {
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

/// Appends events to a JSON-lines file.
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append one event. Best-effort: failures warn and are swallowed.
    pub fn append(&self, task_id: &str, event: Event) {
        let record = JournalRecord {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            event,
        };
        let Ok(line) = serde_json::to_string(&record) else {
            warn!("failed to serialize journal event");
            return;
        };
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "{}", line));
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "failed to append journal event");
        }
    }

    /// Read back all records (for `status` and tests).
    pub fn read_all(&self) -> Vec<JournalRecord> {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
