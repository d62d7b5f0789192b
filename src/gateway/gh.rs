//! `gh` CLI implementation of the repository gateway.
//!
//! Each operation shells out to the GitHub CLI, which owns authentication
//! and the API surface. Comment bodies are passed via stdin (`--body-file -`)
//! so signal-bearing text never hits the argv.

use super::{DraftPrRequest, IssueDetails, RepoGateway};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct GhGateway {
    command: String,
    /// Appended to every comment so the controller can recognize its own
    /// posts in later discussion fetches.
    signature_footer: String,
}

/// Wire shape of `gh issue view --json ...`.
#[derive(Debug, Deserialize)]
struct GhIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    comments: Vec<GhComment>,
}

#[derive(Debug, Deserialize)]
struct GhComment {
    #[serde(default)]
    author: GhAuthor,
    #[serde(default)]
    body: String,
}

#[derive(Debug, Default, Deserialize)]
struct GhAuthor {
    #[serde(default)]
    login: String,
}

#[derive(Debug, Deserialize)]
struct GhMergeView {
    #[serde(rename = "mergeCommit")]
    merge_commit: Option<GhMergeCommit>,
}

#[derive(Debug, Deserialize)]
struct GhMergeCommit {
    oid: String,
}

impl GhGateway {
    pub fn new(command: &str, signature_footer: &str) -> Self {
        Self {
            command: command.to_string(),
            signature_footer: signature_footer.to_string(),
        }
    }

    fn signed(&self, body: &str) -> String {
        if self.signature_footer.is_empty() {
            body.to_string()
        } else {
            format!("{}\n\n{}", body.trim_end(), self.signature_footer)
        }
    }

    async fn run(&self, args: &[&str], stdin_body: Option<&str>) -> Result<String> {
        debug!(command = %self.command, ?args, "invoking gh");
        let mut cmd = Command::new(&self.command);
        cmd.args(args)
            .stdin(if stdin_body.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.command))?;

        if let Some(body) = stdin_body {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(body.as_bytes())
                    .await
                    .context("Failed to write gh stdin")?;
                stdin.shutdown().await.context("Failed to close gh stdin")?;
            }
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for gh")?;
        if !output.status.success() {
            anyhow::bail!(
                "gh {} failed (exit {}): {}",
                args.first().copied().unwrap_or(""),
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl RepoGateway for GhGateway {
    async fn fetch_issue(&self, repository: &str, number: u64) -> Result<IssueDetails> {
        let num = number.to_string();
        let stdout = self
            .run(
                &[
                    "issue",
                    "view",
                    &num,
                    "--repo",
                    repository,
                    "--json",
                    "number,title,body,url,comments",
                ],
                None,
            )
            .await?;
        let issue: GhIssue =
            serde_json::from_str(&stdout).context("Failed to parse gh issue view output")?;
        Ok(IssueDetails {
            number: issue.number,
            title: issue.title,
            body: issue.body,
            url: issue.url,
            comments: issue
                .comments
                .into_iter()
                .map(|c| super::IssueComment {
                    author: c.author.login,
                    body: c.body,
                })
                .collect(),
        })
    }

    async fn comment_issue(&self, repository: &str, number: u64, body: &str) -> Result<()> {
        let num = number.to_string();
        self.run(
            &[
                "issue",
                "comment",
                &num,
                "--repo",
                repository,
                "--body-file",
                "-",
            ],
            Some(&self.signed(body)),
        )
        .await?;
        Ok(())
    }

    async fn comment_pr(&self, repository: &str, number: u64, body: &str) -> Result<()> {
        let num = number.to_string();
        self.run(
            &[
                "pr",
                "comment",
                &num,
                "--repo",
                repository,
                "--body-file",
                "-",
            ],
            Some(&self.signed(body)),
        )
        .await?;
        Ok(())
    }

    async fn create_draft_pr(&self, repository: &str, request: &DraftPrRequest) -> Result<u64> {
        let stdout = self
            .run(
                &[
                    "pr",
                    "create",
                    "--repo",
                    repository,
                    "--draft",
                    "--title",
                    &request.title,
                    "--head",
                    &request.head_branch,
                    "--base",
                    &request.base_branch,
                    "--body-file",
                    "-",
                ],
                Some(&self.signed(&request.body)),
            )
            .await?;
        // gh prints the PR URL; the number is its last path segment.
        let url = stdout.trim();
        url.rsplit('/')
            .next()
            .and_then(|s| s.parse().ok())
            .with_context(|| format!("Could not parse PR number from '{}'", url))
    }

    async fn mark_pr_ready(&self, repository: &str, number: u64) -> Result<()> {
        let num = number.to_string();
        self.run(&["pr", "ready", &num, "--repo", repository], None)
            .await?;
        Ok(())
    }

    async fn merge_pr(&self, repository: &str, number: u64) -> Result<Option<String>> {
        let num = number.to_string();
        self.run(
            &["pr", "merge", &num, "--repo", repository, "--squash"],
            None,
        )
        .await?;
        // The merge SHA is reported by a follow-up view; absence is not an
        // error, the merge itself already happened.
        let sha = match self
            .run(
                &["pr", "view", &num, "--repo", repository, "--json", "mergeCommit"],
                None,
            )
            .await
        {
            Ok(stdout) => serde_json::from_str::<GhMergeView>(&stdout)
                .ok()
                .and_then(|v| v.merge_commit)
                .map(|c| c.oid),
            Err(_) => None,
        };
        Ok(sha)
    }

    async fn finalize_pr(&self, repository: &str, number: u64) -> Result<()> {
        self.mark_pr_ready(repository, number).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_appends_footer() {
        let gw = GhGateway::new("gh", "— agentium");
        assert_eq!(gw.signed("Hello.\n"), "Hello.\n\n— agentium");
    }

    #[test]
    fn test_signed_empty_footer_is_identity() {
        let gw = GhGateway::new("gh", "");
        assert_eq!(gw.signed("Hello."), "Hello.");
    }

    #[test]
    fn test_parse_gh_issue_shape() {
        let json = r#"{
            "number": 42,
            "title": "Widget wobbles",
            "body": "Steps to reproduce...",
            "url": "https://github.com/octo/widgets/issues/42",
            "comments": [
                {"author": {"login": "alice"}, "body": "me too"}
            ]
        }"#;
        let issue: GhIssue = serde_json::from_str(json).unwrap();
        assert_eq!(issue.number, 42);
        assert_eq!(issue.comments[0].author.login, "alice");
    }

    #[test]
    fn test_parse_merge_view_shape() {
        let json = r#"{"mergeCommit": {"oid": "abc123"}}"#;
        let view: GhMergeView = serde_json::from_str(json).unwrap();
        assert_eq!(view.merge_commit.unwrap().oid, "abc123");

        let none: GhMergeView = serde_json::from_str(r#"{"mergeCommit": null}"#).unwrap();
        assert!(none.merge_commit.is_none());
    }
}
