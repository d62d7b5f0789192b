//! Unified configuration for agentium.
//!
//! Reads `agentium.toml` from the project directory (or a path given on the
//! CLI). Layering is file → environment → CLI flags, with serde defaults
//! for everything so an empty file is a valid configuration.
//!
//! # Configuration File Format
//!
//! ```toml
//! [session]
//! max_global_iterations = 50
//! deadline_minutes = 240
//!
//! [phase_loop]
//! plan_max_iter = 3
//! implement_max_iter = 5
//! judge_context_budget = 16000
//! judge_no_signal_limit = 2
//! reviewer_skip_on = ["empty_output", "simple_output"]
//! skip_plan_if_exists = true
//!
//! [workflow]
//! docs = true
//! auto_merge = true
//! container_reuse = true
//!
//! [[phases]]
//! name = "PLAN"
//! max_iterations = 4
//! worker_prompt = "Focus on minimal diffs."
//!
//! [adapters]
//! worker = "claude"
//! reviewer = "claude"
//! judge = "claude"
//! claude_cmd = "claude"
//!
//! [github]
//! gh_cmd = "gh"
//! signature_footer = "— agentium"
//!
//! [container]
//! image = "ghcr.io/agentium/agent:latest"
//!
//! [params]
//! team = "platform"
//! ```

use crate::task::Phase;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Session-wide limits feeding the global termination predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_global_iterations")]
    pub max_global_iterations: u32,
    /// Wall-clock deadline for the whole session, in minutes.
    #[serde(default = "default_deadline_minutes")]
    pub deadline_minutes: u64,
}

fn default_max_global_iterations() -> u32 {
    50
}

fn default_deadline_minutes() -> u64 {
    240
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_global_iterations: default_max_global_iterations(),
            deadline_minutes: default_deadline_minutes(),
        }
    }
}

/// Inner-loop tuning: iteration budgets, judge context, skip policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseLoopConfig {
    /// Per-phase budget overrides. Applied only on the COMPLEX path.
    #[serde(default)]
    pub plan_max_iter: Option<u32>,
    #[serde(default)]
    pub implement_max_iter: Option<u32>,
    #[serde(default)]
    pub docs_max_iter: Option<u32>,
    #[serde(default)]
    pub verify_max_iter: Option<u32>,
    /// Global fallback budget for any phase without a specific override.
    #[serde(default)]
    pub max_iter: Option<u32>,
    #[serde(default = "default_judge_context_budget")]
    pub judge_context_budget: usize,
    #[serde(default = "default_judge_no_signal_limit")]
    pub judge_no_signal_limit: u32,
    #[serde(default)]
    pub reviewer_skip: bool,
    #[serde(default)]
    pub reviewer_skip_on: Vec<String>,
    #[serde(default)]
    pub judge_skip: bool,
    #[serde(default)]
    pub judge_skip_on: Vec<String>,
    /// Extract a plan from the issue body instead of running the PLAN
    /// worker, when the body already contains plan-shaped sections.
    #[serde(default)]
    pub skip_plan_if_exists: bool,
    #[serde(default = "default_memory_max_entries")]
    pub memory_max_entries: usize,
}

pub fn default_judge_context_budget() -> usize {
    16_000
}

pub fn default_judge_no_signal_limit() -> u32 {
    2
}

fn default_memory_max_entries() -> usize {
    200
}

impl Default for PhaseLoopConfig {
    fn default() -> Self {
        Self {
            plan_max_iter: None,
            implement_max_iter: None,
            docs_max_iter: None,
            verify_max_iter: None,
            max_iter: None,
            judge_context_budget: default_judge_context_budget(),
            judge_no_signal_limit: default_judge_no_signal_limit(),
            reviewer_skip: false,
            reviewer_skip_on: Vec::new(),
            judge_skip: false,
            judge_skip_on: Vec::new(),
            skip_plan_if_exists: false,
            memory_max_entries: default_memory_max_entries(),
        }
    }
}

/// Custom phase definition. When any are present, their order replaces the
/// default phase order verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub name: String,
    #[serde(default)]
    pub max_iterations: Option<u32>,
    #[serde(default)]
    pub worker_prompt: Option<String>,
    #[serde(default)]
    pub reviewer_prompt: Option<String>,
    #[serde(default)]
    pub judge_criteria: Option<String>,
}

/// Workflow shape toggles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Append DOCS to the default phase order.
    #[serde(default)]
    pub docs: bool,
    /// Append VERIFY and attempt merge when checks pass.
    #[serde(default)]
    pub auto_merge: bool,
    /// Keep one warm container per role per phase.
    #[serde(default)]
    pub container_reuse: bool,
}

/// Adapter routing and agent CLI settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptersConfig {
    #[serde(default = "default_adapter_name")]
    pub worker: String,
    #[serde(default = "default_adapter_name")]
    pub reviewer: String,
    #[serde(default = "default_adapter_name")]
    pub judge: String,
    #[serde(default = "default_claude_cmd")]
    pub claude_cmd: String,
    #[serde(default = "default_skip_permissions")]
    pub skip_permissions: bool,
}

fn default_adapter_name() -> String {
    "claude".to_string()
}

fn default_claude_cmd() -> String {
    "claude".to_string()
}

fn default_skip_permissions() -> bool {
    true
}

impl Default for AdaptersConfig {
    fn default() -> Self {
        Self {
            worker: default_adapter_name(),
            reviewer: default_adapter_name(),
            judge: default_adapter_name(),
            claude_cmd: default_claude_cmd(),
            skip_permissions: default_skip_permissions(),
        }
    }
}

/// Hosted-repository gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default = "default_gh_cmd")]
    pub gh_cmd: String,
    /// Footer appended to controller comments; also the filter key for
    /// recognizing its own posts in discussion.
    #[serde(default = "default_signature_footer")]
    pub signature_footer: String,
}

fn default_gh_cmd() -> String {
    "gh".to_string()
}

fn default_signature_footer() -> String {
    "— agentium".to_string()
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            gh_cmd: default_gh_cmd(),
            signature_footer: default_signature_footer(),
        }
    }
}

/// Container sandbox settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Image for role containers. None leaves adapters host-only.
    #[serde(default)]
    pub image: Option<String>,
    /// host path → container path read-only bind mounts for credentials.
    #[serde(default)]
    pub auth_mounts: HashMap<String, String>,
}

/// Credential refresh settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shell command run before each iteration; non-zero exit blocks the
    /// task. None disables the check.
    #[serde(default)]
    pub refresh_command: Option<String>,
}

/// The unified configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentiumConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub phase_loop: PhaseLoopConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub phases: Vec<PhaseSpec>,
    #[serde(default)]
    pub adapters: AdaptersConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub container: ContainerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    /// User template parameters; win over built-ins on key collision.
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl AgentiumConfig {
    /// Load from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the loop cannot honor.
    pub fn validate(&self) -> Result<()> {
        for spec in &self.phases {
            let phase: Phase = spec
                .name
                .parse()
                .with_context(|| format!("Unknown phase '{}' in [[phases]]", spec.name))?;
            if phase.is_terminal() {
                anyhow::bail!("Terminal phase '{}' cannot appear in [[phases]]", spec.name);
            }
            if spec.max_iterations == Some(0) {
                anyhow::bail!("Phase '{}' has a zero iteration budget", spec.name);
            }
        }
        if self.phase_loop.judge_no_signal_limit == 0 {
            anyhow::bail!("judge_no_signal_limit must be at least 1");
        }
        Ok(())
    }

    /// Resolve the working-phase order.
    ///
    /// Custom `[[phases]]` are used verbatim; otherwise the default order is
    /// `[PLAN, IMPLEMENT]` with DOCS and VERIFY appended when configured.
    /// VERIFY is always appended when auto-merge is on and it is absent.
    pub fn phase_order(&self) -> Vec<Phase> {
        let mut order: Vec<Phase> = if self.phases.is_empty() {
            let mut order = vec![Phase::Plan, Phase::Implement];
            if self.workflow.docs {
                order.push(Phase::Docs);
            }
            if self.workflow.auto_merge {
                order.push(Phase::Verify);
            }
            order
        } else {
            // validate() guarantees these parse.
            self.phases
                .iter()
                .filter_map(|spec| spec.name.parse().ok())
                .collect()
        };
        if self.workflow.auto_merge && !order.contains(&Phase::Verify) {
            order.push(Phase::Verify);
        }
        order
    }

    /// The custom phase spec for `phase`, if one is configured.
    pub fn phase_spec(&self, phase: Phase) -> Option<&PhaseSpec> {
        self.phases
            .iter()
            .find(|spec| spec.name.parse::<Phase>().ok() == Some(phase))
    }

    /// Per-phase budget override, custom phase spec first, then the
    /// `[phase_loop]` knob for the phase.
    fn phase_override(&self, phase: Phase) -> Option<u32> {
        if let Some(value) = self.phase_spec(phase).and_then(|s| s.max_iterations) {
            return Some(value);
        }
        match phase {
            Phase::Plan => self.phase_loop.plan_max_iter,
            Phase::Implement => self.phase_loop.implement_max_iter,
            Phase::Docs => self.phase_loop.docs_max_iter,
            Phase::Verify => self.phase_loop.verify_max_iter,
            _ => None,
        }
    }

    /// Resolve `maxIter` for a phase. SIMPLE tasks get the SIMPLE budgets
    /// unconditionally; otherwise per-phase override, then global override,
    /// then defaults.
    pub fn max_iterations_for(&self, phase: Phase, path: crate::task::WorkflowPath) -> u32 {
        if path == crate::task::WorkflowPath::Simple {
            return phase.simple_budget();
        }
        self.phase_override(phase)
            .or(self.phase_loop.max_iter)
            .unwrap_or_else(|| phase.default_budget())
    }
}
