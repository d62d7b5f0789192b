//! Reviewer/Judge skip policies.
//!
//! Trivial worker output does not need a full review cycle. Each role has a
//! boolean skip flag (always skips) and a list of skip-on conditions
//! evaluated against the phase output. The `simple_output` threshold is
//! uniform across phases: fewer than 10 non-empty lines.

use crate::util::non_empty_line_count;
use std::str::FromStr;

/// Non-empty-line threshold below which output counts as `simple_output`.
const SIMPLE_OUTPUT_LINES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipCondition {
    /// Output is whitespace-only.
    EmptyOutput,
    /// Fewer than 10 non-empty lines.
    SimpleOutput,
    /// IMPLEMENT handoff shows zero changed files.
    NoCodeChanges,
}

impl SkipCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipCondition::EmptyOutput => "empty_output",
            SkipCondition::SimpleOutput => "simple_output",
            SkipCondition::NoCodeChanges => "no_code_changes",
        }
    }
}

impl FromStr for SkipCondition {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "empty_output" => Ok(SkipCondition::EmptyOutput),
            "simple_output" => Ok(SkipCondition::SimpleOutput),
            "no_code_changes" => Ok(SkipCondition::NoCodeChanges),
            _ => anyhow::bail!(
                "Unknown skip condition '{}'. Valid: empty_output, simple_output, no_code_changes",
                s
            ),
        }
    }
}

/// Evaluate a role's skip policy.
///
/// Returns the reason to skip, or None to run the role. The boolean flag
/// always wins; unknown condition names are ignored (config validation
/// warns about them elsewhere).
pub fn should_skip(
    skip_flag: bool,
    skip_on: &[String],
    phase_output: &str,
    zero_code_changes: bool,
) -> Option<String> {
    if skip_flag {
        return Some("skip flag set".to_string());
    }
    for name in skip_on {
        let Ok(condition) = name.parse::<SkipCondition>() else {
            continue;
        };
        let hit = match condition {
            SkipCondition::EmptyOutput => phase_output.trim().is_empty(),
            SkipCondition::SimpleOutput => {
                non_empty_line_count(phase_output) < SIMPLE_OUTPUT_LINES
            }
            SkipCondition::NoCodeChanges => zero_code_changes,
        };
        if hit {
            return Some(condition.as_str().to_string());
        }
    }
    None
}
