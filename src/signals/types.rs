//! Verdict and feedback-response signal types.

use crate::task::WorkflowPath;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The judge's decision for an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictKind {
    /// Phase output is acceptable; move on.
    Advance,
    /// Another iteration is needed; feedback goes to memory.
    Iterate,
    /// The task cannot proceed without human intervention.
    Blocked,
}

impl VerdictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictKind::Advance => "ADVANCE",
            VerdictKind::Iterate => "ITERATE",
            VerdictKind::Blocked => "BLOCKED",
        }
    }
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A parsed verdict with its free-text feedback.
///
/// `signal_found` is false when no recognizable signal line was present and
/// the kind is the caller's fail-closed default; the no-signal counter in
/// the iteration loop keys off this flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub kind: VerdictKind,
    pub feedback: String,
    pub signal_found: bool,
}

impl Verdict {
    pub fn found(kind: VerdictKind, feedback: impl Into<String>) -> Self {
        Self {
            kind,
            feedback: feedback.into(),
            signal_found: true,
        }
    }

    /// Fail-closed verdict for output with no recognizable signal.
    pub fn fail_closed(kind: VerdictKind) -> Self {
        Self {
            kind,
            feedback: String::new(),
            signal_found: false,
        }
    }

    pub fn is_advance(&self) -> bool {
        self.kind == VerdictKind::Advance
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.feedback.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{} {}", self.kind, self.feedback)
        }
    }
}

/// Output of the complexity assessor: SIMPLE or COMPLEX.
///
/// `path` is never [`WorkflowPath::Unset`]; an unparseable assessment fails
/// closed to COMPLEX.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathVerdict {
    pub path: WorkflowPath,
    pub feedback: String,
    pub signal_found: bool,
}

impl PathVerdict {
    pub fn found(path: WorkflowPath, feedback: impl Into<String>) -> Self {
        Self {
            path,
            feedback: feedback.into(),
            signal_found: true,
        }
    }

    pub fn fail_closed() -> Self {
        Self {
            path: WorkflowPath::Complex,
            feedback: String::new(),
            signal_found: false,
        }
    }
}

/// How the worker says it handled a piece of prior feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeedbackDisposition {
    Addressed,
    Declined,
    Partial,
}

impl FeedbackDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackDisposition::Addressed => "ADDRESSED",
            FeedbackDisposition::Declined => "DECLINED",
            FeedbackDisposition::Partial => "PARTIAL",
        }
    }
}

impl fmt::Display for FeedbackDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A worker's `AGENTIUM_MEMORY: FEEDBACK_RESPONSE ...` line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub disposition: FeedbackDisposition,
    pub summary: String,
    pub response: String,
}

impl fmt::Display for FeedbackResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} - {}",
            self.disposition, self.summary, self.response
        )
    }
}
