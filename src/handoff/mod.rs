//! Structured inter-phase handoff.
//!
//! At the end of a phase turn the worker emits an `AGENTIUM_HANDOFF:` line
//! introducing a single JSON object describing its work structurally. The
//! payload is parsed into a phase-discriminated artifact, validated (warn,
//! never block) and stored per `{task, phase}` — newer iterations overwrite
//! older ones so the reviewer is never shown stale data.

mod parser;
mod store;
mod types;

pub use parser::{extract_handoff_payload, parse_phase_artifact};
pub use store::{HandoffStore, StoredArtifact};
pub use types::{
    Commit, DocsOutput, ImplementOutput, PhaseArtifact, PlanOutput, PlanStep, VerifyOutput,
};
