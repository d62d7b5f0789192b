//! Persisted per-task handoff store.
//!
//! Keeps the latest artifact per `{task, phase}` plus the immutable issue
//! context installed at phase-loop entry. Persistence is atomic (temp file
//! rename) and best-effort: a failed save is the caller's warning, never a
//! loop-stopping error.

use super::types::PhaseArtifact;
use crate::task::{Phase, TaskContext};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// An artifact with the iteration that produced it, so consumers can detect
/// stale (older-iteration) data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub iteration: u32,
    pub artifact: PhaseArtifact,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TaskHandoffs {
    #[serde(default)]
    context: Option<TaskContext>,
    #[serde(default)]
    outputs: HashMap<Phase, StoredArtifact>,
}

/// Map of task id to its handoff state, persisted as one JSON document.
#[derive(Debug)]
pub struct HandoffStore {
    path: PathBuf,
    tasks: HashMap<String, TaskHandoffs>,
}

impl HandoffStore {
    /// Create a store backed by `path`, loading existing state if present.
    pub fn open(path: PathBuf) -> Result<Self> {
        let tasks = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content).context("Failed to parse handoff store")?
        } else {
            HashMap::new()
        };
        Ok(Self { path, tasks })
    }

    /// Store a phase output, overwriting any earlier artifact for the same
    /// phase regardless of iteration.
    pub fn store_phase_output(
        &mut self,
        task_id: &str,
        phase: Phase,
        iteration: u32,
        artifact: PhaseArtifact,
    ) {
        let entry = self.tasks.entry(task_id.to_string()).or_default();
        entry.outputs.insert(
            phase,
            StoredArtifact {
                iteration,
                artifact,
                recorded_at: Utc::now(),
            },
        );
    }

    /// Latest artifact for `{task, phase}`, with its iteration index.
    pub fn get_phase_output(&self, task_id: &str, phase: Phase) -> Option<&StoredArtifact> {
        self.tasks.get(task_id)?.outputs.get(&phase)
    }

    /// Artifact for `{task, phase}` only if it came from `iteration`.
    /// Stale artifacts must not be shown to the reviewer.
    pub fn get_current_output(
        &self,
        task_id: &str,
        phase: Phase,
        iteration: u32,
    ) -> Option<&StoredArtifact> {
        self.get_phase_output(task_id, phase)
            .filter(|stored| stored.iteration == iteration)
    }

    /// Install the immutable task context at phase-loop entry.
    pub fn set_issue_context(&mut self, task_id: &str, ctx: TaskContext) {
        self.tasks.entry(task_id.to_string()).or_default().context = Some(ctx);
    }

    pub fn issue_context(&self, task_id: &str) -> Option<&TaskContext> {
        self.tasks.get(task_id)?.context.as_ref()
    }

    /// Atomic persistence: serialize, write a temp file, rename over.
    pub fn save(&self) -> Result<()> {
        let json =
            serde_json::to_string_pretty(&self.tasks).context("Failed to serialize handoffs")?;
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
