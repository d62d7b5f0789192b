//! Control-plane signal grammar.
//!
//! The LLM is untrusted, so every control decision is carried by a
//! line-anchored signal the controller extracts post-hoc from agent output:
//!
//! - `AGENTIUM_EVAL: <VERDICT> [feedback]` - judge / assessor verdicts
//! - `AGENTIUM_MEMORY: FEEDBACK_RESPONSE <disposition> <summary> - <response>`
//!   - worker responses to prior feedback
//!
//! (Handoff payloads use the `AGENTIUM_HANDOFF:` marker and live in
//! [`crate::handoff`].) Free text never reaches a config path.

mod parser;
mod types;

pub use parser::{
    parse_feedback_responses, parse_path_verdict, parse_verdict, strip_signal_lines,
    EVAL_PREFIX, HANDOFF_PREFIX, MEMORY_PREFIX,
};
pub use types::{FeedbackDisposition, FeedbackResponse, PathVerdict, Verdict, VerdictKind};
