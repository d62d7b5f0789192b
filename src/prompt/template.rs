//! `{variable}` substitution for prompt templates.

use std::collections::HashMap;

/// Replace `{key}` placeholders with values.
///
/// Built-ins are applied first and user parameters second, so a user key
/// shadowing a built-in wins. Unknown placeholders are left untouched.
pub fn substitute(
    text: &str,
    builtins: &HashMap<String, String>,
    user: &HashMap<String, String>,
) -> String {
    let mut merged: HashMap<&str, &str> = HashMap::new();
    for (k, v) in builtins {
        merged.insert(k.as_str(), v.as_str());
    }
    for (k, v) in user {
        merged.insert(k.as_str(), v.as_str());
    }

    let mut result = text.to_string();
    for (key, value) in merged {
        result = result.replace(&format!("{{{}}}", key), value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_substitutes_builtins() {
        let result = substitute(
            "Repo {repository}, issue {issue_number}",
            &map(&[("repository", "octo/widgets"), ("issue_number", "42")]),
            &HashMap::new(),
        );
        assert_eq!(result, "Repo octo/widgets, issue 42");
    }

    #[test]
    fn test_user_params_win_on_collision() {
        let result = substitute(
            "{repository}",
            &map(&[("repository", "builtin/value")]),
            &map(&[("repository", "user/value")]),
        );
        assert_eq!(result, "user/value");
    }

    #[test]
    fn test_unknown_placeholders_left_alone() {
        let result = substitute("{unknown} stays", &HashMap::new(), &HashMap::new());
        assert_eq!(result, "{unknown} stays");
    }
}
