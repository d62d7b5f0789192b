use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::File;
use std::path::PathBuf;

use crate::agentium_config::AgentiumConfig;
use crate::task::{Phase, Role};

/// Runtime configuration for one controller session.
///
/// Bridges the unified [`AgentiumConfig`] with the session's filesystem
/// layout: one directory per session under `.agentium/sessions/` holding
/// the handoff store, memory store, task snapshot, event journal, log file
/// and per-turn output captures.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub session_id: String,
    pub session_dir: PathBuf,
    pub verbose: bool,
    pub settings: AgentiumConfig,
}

impl Config {
    pub fn new(
        project_dir: PathBuf,
        config_file: Option<PathBuf>,
        session_id: Option<String>,
        verbose: bool,
    ) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;

        let config_path = config_file.unwrap_or_else(|| project_dir.join("agentium.toml"));
        let settings = AgentiumConfig::load(&config_path)?;

        let session_id =
            session_id.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        let session_dir = project_dir
            .join(".agentium")
            .join("sessions")
            .join(&session_id);

        Ok(Self {
            project_dir,
            session_id,
            session_dir,
            verbose,
            settings,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(self.turns_dir())
            .context("Failed to create session turns directory")?;
        Ok(())
    }

    /// Exclusive advisory lock so two controllers never share one session
    /// directory. Held for the life of the returned file handle.
    pub fn lock_session(&self) -> Result<File> {
        let lock_path = self.session_dir.join(".lock");
        let file = File::create(&lock_path)
            .with_context(|| format!("Failed to create {}", lock_path.display()))?;
        file.try_lock_exclusive()
            .context("Session directory is locked by another agentium process")?;
        Ok(file)
    }

    pub fn handoff_path(&self) -> PathBuf {
        self.session_dir.join("handoff.json")
    }

    pub fn memory_path(&self) -> PathBuf {
        self.session_dir.join("memory.json")
    }

    pub fn task_path(&self) -> PathBuf {
        self.session_dir.join("task.json")
    }

    pub fn journal_path(&self) -> PathBuf {
        self.session_dir.join("events.jsonl")
    }

    pub fn log_path(&self) -> PathBuf {
        self.session_dir.join("agentium.log")
    }

    pub fn turns_dir(&self) -> PathBuf {
        self.session_dir.join("turns")
    }

    /// Raw output capture for one agent turn.
    pub fn turn_capture_path(&self, phase: Phase, iteration: u32, role: Role) -> PathBuf {
        self.turns_dir()
            .join(format!("{}-{}-{}.log", phase.slug(), iteration, role))
    }
}
