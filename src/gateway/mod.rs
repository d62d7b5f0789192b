//! Hosted-repository gateway.
//!
//! The core consumes this interface for every issue/PR operation; the
//! default implementation drives the `gh` CLI. All operations are
//! best-effort from the loop's standpoint: call sites log failures and
//! keep going rather than crash an otherwise healthy iteration.

mod gh;

pub use gh::GhGateway;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One comment in an issue's discussion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueComment {
    pub author: String,
    pub body: String,
}

/// Issue details the controller needs to seed a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueDetails {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub url: String,
    #[serde(default)]
    pub comments: Vec<IssueComment>,
}

/// Request to open a draft PR for the work branch.
#[derive(Debug, Clone, Default)]
pub struct DraftPrRequest {
    pub title: String,
    pub body: String,
    pub head_branch: String,
    pub base_branch: String,
}

/// Operations the core invokes against the hosted repository.
#[async_trait]
pub trait RepoGateway: Send + Sync {
    async fn fetch_issue(&self, repository: &str, number: u64) -> Result<IssueDetails>;

    async fn comment_issue(&self, repository: &str, number: u64, body: &str) -> Result<()>;

    async fn comment_pr(&self, repository: &str, number: u64, body: &str) -> Result<()>;

    /// Returns the new PR number.
    async fn create_draft_pr(&self, repository: &str, request: &DraftPrRequest) -> Result<u64>;

    async fn mark_pr_ready(&self, repository: &str, number: u64) -> Result<()>;

    /// Returns the merge commit SHA when the host reports one.
    async fn merge_pr(&self, repository: &str, number: u64) -> Result<Option<String>>;

    /// Final disposition of the PR at task completion: ready-for-review
    /// when mergeable, otherwise left as is (the NOMERGE comment is posted
    /// separately by the caller).
    async fn finalize_pr(&self, repository: &str, number: u64) -> Result<()>;
}

/// Drop comments authored by the controller itself, identified by the
/// configurable signature footer appended to everything it posts.
pub fn filter_discussion(comments: &[IssueComment], signature_footer: &str) -> Vec<String> {
    comments
        .iter()
        .filter(|c| {
            signature_footer.is_empty() || !c.body.trim_end().ends_with(signature_footer)
        })
        .map(|c| format!("{}: {}", c.author, c.body))
        .collect()
}
