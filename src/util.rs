//! Shared utility functions for the agentium crate.

/// Extract a JSON object from text that may contain other content.
/// Uses brace-counting to find the outermost JSON object.
pub fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0;
    let mut end = start;

    for (i, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = start + i + 1;
                    break;
                }
            }
            _ => {}
        }
    }

    if depth == 0 && end > start {
        Some(text[start..end].to_string())
    } else {
        None
    }
}

/// Truncate `text` to at most `max_chars` characters, appending `...` when
/// anything was cut. Counted in chars, not bytes, so multi-byte text never
/// splits mid-character. The result is at most `max_chars + 3` chars long.
pub fn extract_summary(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(max_chars).collect();
    format!("{}...", head)
}

/// Truncate `text` to at most `budget` characters, keeping the tail.
/// The end of an agent turn carries the verdict-relevant content (summaries,
/// signal lines), so overflow drops the head, with a marker noting the cut.
pub fn truncate_tail(text: &str, budget: usize) -> String {
    let total = text.chars().count();
    if total <= budget {
        return text.to_string();
    }
    let tail: String = text.chars().skip(total - budget).collect();
    format!("[...truncated {} chars...]\n{}", total - budget, tail)
}

/// Count non-empty (non-whitespace-only) lines in a block of text.
pub fn non_empty_line_count(text: &str) -> usize {
    text.lines().filter(|l| !l.trim().is_empty()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_object_simple() {
        let text = r#"{"key": "value"}"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"key": "value"}"#.to_string())
        );
    }

    #[test]
    fn test_extract_json_object_with_prefix() {
        let text = r#"Here is the JSON: {"key": "value"}"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"key": "value"}"#.to_string())
        );
    }

    #[test]
    fn test_extract_json_object_nested() {
        let text = r#"{"outer": {"inner": "value"}} trailing"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"outer": {"inner": "value"}}"#.to_string())
        );
    }

    #[test]
    fn test_extract_json_object_unbalanced() {
        assert_eq!(extract_json_object(r#"{"key": "value""#), None);
        assert_eq!(extract_json_object("no braces here"), None);
    }

    #[test]
    fn test_extract_summary_short_text_unchanged() {
        assert_eq!(extract_summary("short", 10), "short");
        assert_eq!(extract_summary("  padded  ", 10), "padded");
    }

    #[test]
    fn test_extract_summary_truncates_with_ellipsis() {
        let result = extract_summary("abcdefghij", 5);
        assert_eq!(result, "abcde...");
    }

    #[test]
    fn test_extract_summary_length_bound_holds_for_multibyte() {
        let input = "日本語のテキストが続きます";
        for n in 0..20 {
            let result = extract_summary(input, n);
            assert!(
                result.chars().count() <= n + 3,
                "bound violated at n={}: {:?}",
                n,
                result
            );
        }
    }

    #[test]
    fn test_truncate_tail_keeps_end() {
        let text = "aaaa bbbb cccc VERDICT";
        let result = truncate_tail(text, 7);
        assert!(result.ends_with("VERDICT"));
        assert!(result.contains("truncated"));
    }

    #[test]
    fn test_truncate_tail_within_budget_unchanged() {
        assert_eq!(truncate_tail("short", 100), "short");
    }

    #[test]
    fn test_non_empty_line_count() {
        assert_eq!(non_empty_line_count("a\n\n  \nb\nc"), 3);
        assert_eq!(non_empty_line_count(""), 0);
        assert_eq!(non_empty_line_count("   \n\t\n"), 0);
    }
}
