//! Signal parsing from agent output.
//!
//! Extracts control signals using line-anchored regex patterns:
//! - `AGENTIUM_EVAL: <VERDICT> [feedback]`
//! - `AGENTIUM_MEMORY: FEEDBACK_RESPONSE <disposition> <summary> - <response>`
//!
//! Verdict scanning is two-pass. The raw pass ignores anything inside
//! markdown fences, so a verdict quoted in an example block cannot override
//! a real one. Only when the raw pass finds nothing are the fence markers
//! stripped and the text rescanned, tolerating agents that wrap their whole
//! answer in a code block. Unknown verdict words fail closed.

use super::types::{FeedbackDisposition, FeedbackResponse, PathVerdict, Verdict, VerdictKind};
use crate::task::WorkflowPath;
use regex::Regex;
use std::sync::LazyLock;

/// Marker introducing a typed handoff payload (parsed in [`crate::handoff`]).
pub const HANDOFF_PREFIX: &str = "AGENTIUM_HANDOFF:";
/// Marker introducing a verdict line.
pub const EVAL_PREFIX: &str = "AGENTIUM_EVAL:";
/// Marker introducing a memory signal line.
pub const MEMORY_PREFIX: &str = "AGENTIUM_MEMORY:";

static EVAL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^AGENTIUM_EVAL:[ \t]*([A-Z][A-Z_]*)(?:[ \t]+(.*))?$").unwrap()
});

static FEEDBACK_RESPONSE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^AGENTIUM_MEMORY:[ \t]*FEEDBACK_RESPONSE[ \t]+(ADDRESSED|DECLINED|PARTIAL)[ \t]+(.+)$")
        .unwrap()
});

static FENCE_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*```").unwrap());

/// Replace every line inside a fenced block (including the fence markers)
/// with an empty line, preserving line positions.
fn blank_fenced_blocks(text: &str) -> String {
    let mut out = Vec::new();
    let mut in_fence = false;
    for line in text.lines() {
        if FENCE_LINE.is_match(line) {
            in_fence = !in_fence;
            out.push("");
        } else if in_fence {
            out.push("");
        } else {
            out.push(line);
        }
    }
    out.join("\n")
}

/// Drop only the fence marker lines, keeping fenced content scannable.
fn strip_fence_markers(text: &str) -> String {
    text.lines()
        .filter(|line| !FENCE_LINE.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// First `AGENTIUM_EVAL:` line in `text` as (verdict-word, feedback).
fn first_eval_line(text: &str) -> Option<(String, String)> {
    EVAL_REGEX.captures(text).map(|cap| {
        let word = cap.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
        let feedback = cap
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        (word, feedback)
    })
}

/// Two-pass scan: raw (fences blanked) first, fenced fallback second.
fn scan_eval(text: &str) -> Option<(String, String)> {
    first_eval_line(&blank_fenced_blocks(text))
        .or_else(|| first_eval_line(&strip_fence_markers(text)))
}

/// Parse a judge verdict from agent output.
///
/// `fail_closed` is the role's restrictive default, applied when no signal
/// line exists or the verdict word is not in the judge set.
pub fn parse_verdict(text: &str, fail_closed: VerdictKind) -> Verdict {
    match scan_eval(text) {
        Some((word, feedback)) => match word.as_str() {
            "ADVANCE" => Verdict::found(VerdictKind::Advance, feedback),
            "ITERATE" => Verdict::found(VerdictKind::Iterate, feedback),
            "BLOCKED" => Verdict::found(VerdictKind::Blocked, feedback),
            _ => Verdict::fail_closed(fail_closed),
        },
        None => Verdict::fail_closed(fail_closed),
    }
}

/// Parse the complexity assessor's SIMPLE/COMPLEX classification.
/// Anything else fails closed to COMPLEX.
pub fn parse_path_verdict(text: &str) -> PathVerdict {
    match scan_eval(text) {
        Some((word, feedback)) => match word.as_str() {
            "SIMPLE" => PathVerdict::found(WorkflowPath::Simple, feedback),
            "COMPLEX" => PathVerdict::found(WorkflowPath::Complex, feedback),
            _ => PathVerdict::fail_closed(),
        },
        None => PathVerdict::fail_closed(),
    }
}

/// Extract every `FEEDBACK_RESPONSE` line from worker output, in order.
pub fn parse_feedback_responses(text: &str) -> Vec<FeedbackResponse> {
    FEEDBACK_RESPONSE_REGEX
        .captures_iter(text)
        .filter_map(|cap| {
            let disposition = match cap.get(1)?.as_str() {
                "ADDRESSED" => FeedbackDisposition::Addressed,
                "DECLINED" => FeedbackDisposition::Declined,
                "PARTIAL" => FeedbackDisposition::Partial,
                _ => return None,
            };
            let rest = cap.get(2)?.as_str().trim();
            let (summary, response) = match rest.split_once(" - ") {
                Some((s, r)) => (s.trim().to_string(), r.trim().to_string()),
                None => (rest.to_string(), String::new()),
            };
            Some(FeedbackResponse {
                disposition,
                summary,
                response,
            })
        })
        .collect()
}

/// Remove signal lines from agent output before it is posted as a comment.
///
/// Drops any line starting with one of the reserved prefixes, plus the
/// fenced payload block immediately following a bare `AGENTIUM_HANDOFF:`
/// marker, so structured payloads never leak into issue discussion.
pub fn strip_signal_lines(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut lines = text.lines().peekable();
    while let Some(line) = lines.next() {
        let trimmed = line.trim_start();
        if trimmed.starts_with(EVAL_PREFIX) || trimmed.starts_with(MEMORY_PREFIX) {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix(HANDOFF_PREFIX) {
            // Bare marker: swallow a directly following fenced block too.
            if rest.trim().is_empty() {
                if lines.peek().is_some_and(|l| FENCE_LINE.is_match(l)) {
                    lines.next();
                    for fenced in lines.by_ref() {
                        if FENCE_LINE.is_match(fenced) {
                            break;
                        }
                    }
                }
            }
            continue;
        }
        out.push(line);
    }
    out.join("\n").trim().to_string()
}
