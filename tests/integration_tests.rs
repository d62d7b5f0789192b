//! CLI integration tests.
//!
//! Phase-loop behavior is covered in `phase_loop_tests.rs`; these exercise
//! the binary surface: argument validation, config validation and status
//! reporting.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn agentium() -> Command {
    cargo_bin_cmd!("agentium")
}

fn temp_project() -> TempDir {
    TempDir::new().unwrap()
}

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        agentium().arg("--help").assert().success();
    }

    #[test]
    fn test_version() {
        agentium().arg("--version").assert().success();
    }

    #[test]
    fn test_run_requires_repository_or_task_file() {
        let dir = temp_project();
        agentium()
            .current_dir(dir.path())
            .args(["run"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--repository"));
    }
}

mod config_validation {
    use super::*;

    #[test]
    fn test_validate_missing_file_is_valid_defaults() {
        let dir = temp_project();
        agentium()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("valid"));
    }

    #[test]
    fn test_validate_accepts_full_config() {
        let dir = temp_project();
        fs::write(
            dir.path().join("agentium.toml"),
            r#"
[phase_loop]
implement_max_iter = 4
judge_no_signal_limit = 2
reviewer_skip_on = ["empty_output"]

[workflow]
docs = true
auto_merge = true

[[phases]]
name = "PLAN"
max_iterations = 2
"#,
        )
        .unwrap();

        agentium()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success();
    }

    #[test]
    fn test_validate_rejects_unknown_phase() {
        let dir = temp_project();
        fs::write(
            dir.path().join("agentium.toml"),
            "[[phases]]\nname = \"DEPLOY\"\n",
        )
        .unwrap();

        agentium()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("DEPLOY"));
    }

    #[test]
    fn test_validate_rejects_bad_toml() {
        let dir = temp_project();
        fs::write(dir.path().join("agentium.toml"), "not toml {{{").unwrap();

        agentium()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .failure();
    }
}

mod status {
    use super::*;

    #[test]
    fn test_status_without_sessions_reports_none() {
        let dir = temp_project();
        agentium()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No sessions"));
    }
}
