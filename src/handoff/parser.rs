//! Handoff signal extraction from worker output.
//!
//! The grammar is a line starting with `AGENTIUM_HANDOFF:` followed by a
//! single JSON object, either inline on the same line or inside a fenced
//! code block immediately after the marker. The controller knows the active
//! phase, so the payload carries only the fields of that phase's artifact.

use super::types::{DocsOutput, ImplementOutput, PhaseArtifact, PlanOutput, VerifyOutput};
use crate::signals::HANDOFF_PREFIX;
use crate::task::Phase;
use crate::util::extract_json_object;
use anyhow::{Context, Result};

/// Locate the handoff marker and return the raw JSON payload, if any.
///
/// The first marker line wins. An inline payload takes priority; a bare
/// marker tolerates the payload inside a fenced block on the following
/// lines (any fence language tag).
pub fn extract_handoff_payload(text: &str) -> Option<String> {
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        let Some(rest) = line.trim_start().strip_prefix(HANDOFF_PREFIX) else {
            continue;
        };

        // Inline form: AGENTIUM_HANDOFF: { ... }
        if let Some(json) = extract_json_object(rest) {
            return Some(json);
        }

        // Fenced form: marker line, then ```lang / { ... } / ```
        let remainder: String = lines.by_ref().collect::<Vec<_>>().join("\n");
        return extract_json_object(&remainder);
    }
    None
}

/// Parse a handoff payload into the artifact variant for `phase`.
///
/// Terminal phases never produce artifacts; asking for one is a bug in the
/// caller, reported as an error rather than a panic.
pub fn parse_phase_artifact(phase: Phase, payload: &str) -> Result<PhaseArtifact> {
    let artifact = match phase {
        Phase::Plan => PhaseArtifact::Plan(
            serde_json::from_str::<PlanOutput>(payload).context("Invalid PLAN handoff payload")?,
        ),
        Phase::Implement => PhaseArtifact::Implement(
            serde_json::from_str::<ImplementOutput>(payload)
                .context("Invalid IMPLEMENT handoff payload")?,
        ),
        Phase::Docs => PhaseArtifact::Docs(
            serde_json::from_str::<DocsOutput>(payload).context("Invalid DOCS handoff payload")?,
        ),
        Phase::Verify => PhaseArtifact::Verify(
            serde_json::from_str::<VerifyOutput>(payload)
                .context("Invalid VERIFY handoff payload")?,
        ),
        terminal => anyhow::bail!("Phase {} does not accept handoff artifacts", terminal),
    };
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_inline_payload() {
        let text = r#"Plan written.
AGENTIUM_HANDOFF: {"summary": "fix parser", "filesToModify": ["src/lib.rs"]}
Done."#;
        let payload = extract_handoff_payload(text).unwrap();
        assert!(payload.starts_with('{'));
        assert!(payload.contains("fix parser"));
    }

    #[test]
    fn test_extract_fenced_payload() {
        let text = r#"Plan written.
AGENTIUM_HANDOFF:
```json
{"summary": "fix parser"}
```
"#;
        let payload = extract_handoff_payload(text).unwrap();
        assert_eq!(payload, r#"{"summary": "fix parser"}"#);
    }

    #[test]
    fn test_extract_fenced_payload_without_language_tag() {
        let text = "AGENTIUM_HANDOFF:\n```\n{\"summary\": \"x\"}\n```\n";
        assert!(extract_handoff_payload(text).is_some());
    }

    #[test]
    fn test_no_marker_yields_none() {
        assert_eq!(extract_handoff_payload("just prose, no signal"), None);
    }

    #[test]
    fn test_marker_without_payload_yields_none() {
        assert_eq!(extract_handoff_payload("AGENTIUM_HANDOFF:\nno json follows"), None);
    }

    #[test]
    fn test_first_marker_wins() {
        let text = r#"AGENTIUM_HANDOFF: {"summary": "first"}
AGENTIUM_HANDOFF: {"summary": "second"}"#;
        let payload = extract_handoff_payload(text).unwrap();
        assert!(payload.contains("first"));
    }

    #[test]
    fn test_parse_plan_artifact() {
        let payload = r#"{"summary": "add retries", "implementationSteps": [
            {"order": 1, "description": "wrap client", "file": "src/client.rs"}
        ]}"#;
        let artifact = parse_phase_artifact(Phase::Plan, payload).unwrap();
        match artifact {
            PhaseArtifact::Plan(plan) => {
                assert_eq!(plan.summary, "add retries");
                assert_eq!(plan.implementation_steps[0].file, "src/client.rs");
            }
            other => panic!("Expected Plan, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_verify_artifact() {
        let payload = r#"{"mergeSuccessful": true, "mergeSha": "abc123"}"#;
        let artifact = parse_phase_artifact(Phase::Verify, payload).unwrap();
        match artifact {
            PhaseArtifact::Verify(verify) => {
                assert!(verify.merge_successful);
                assert_eq!(verify.merge_sha.as_deref(), Some("abc123"));
            }
            other => panic!("Expected Verify, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_malformed_payload() {
        assert!(parse_phase_artifact(Phase::Plan, "not json").is_err());
    }

    #[test]
    fn test_parse_rejects_terminal_phase() {
        assert!(parse_phase_artifact(Phase::Complete, "{}").is_err());
    }
}
