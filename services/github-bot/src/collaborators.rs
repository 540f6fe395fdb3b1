//! Interfaces to the systems the pipeline drives
//!
//! The pipeline never talks HTTP itself. Every side effect goes through one
//! of these traits so a bot can be wired to GitHub and Jenkins in
//! production and to in-memory fakes in tests.

use async_trait::async_trait;

use crate::error::CollaboratorError;

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Repository labels and the labels of one issue
#[async_trait]
pub trait LabelStore: Send + Sync {
    /// All labels defined on the repository, all pages.
    async fn list_labels(&self) -> CollaboratorResult<Vec<String>>;

    /// Add labels to an issue, keeping the ones it already has.
    async fn add_labels(&self, issue: u64, labels: &[String]) -> CollaboratorResult<()>;

    /// Remove one label from an issue.
    async fn remove_label(&self, issue: u64, label: &str) -> CollaboratorResult<()>;

    /// Replace the labels of an issue.
    async fn update_labels(&self, issue: u64, labels: &[String]) -> CollaboratorResult<()>;
}

/// An open issue as listed by the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenIssue {
    pub number: u64,
    pub author: String,
    pub labels: Vec<String>,
    /// Number of comments on the issue
    pub comments: u64,
}

/// One comment of an issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueNote {
    pub author: String,
    pub body: String,
}

/// Read access to open issues and their comments
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// One page (1-based) of open issues, newest first. Empty past the end.
    async fn list_open_issues(&self, page: u32) -> CollaboratorResult<Vec<OpenIssue>>;

    /// Every comment of `issue`, oldest first.
    async fn list_comments(&self, issue: u64) -> CollaboratorResult<Vec<IssueNote>>;
}

/// Posts comments on issues and pull requests
#[async_trait]
pub trait CommentPoster: Send + Sync {
    async fn post_comment(&self, issue: u64, body: &str) -> CollaboratorResult<()>;
}

/// Membership lookups for the privileged group
#[async_trait]
pub trait TeamDirectory: Send + Sync {
    async fn is_privileged_member(&self, login: &str) -> CollaboratorResult<bool>;
}

/// Jenkins, or anything else that runs CI jobs per pull request
#[async_trait]
pub trait CiTrigger: Send + Sync {
    /// Job names the bot may trigger.
    async fn list_supported_jobs(&self) -> CollaboratorResult<Vec<String>>;

    /// Start `job` for pull request `issue`.
    ///
    /// `CollaboratorError::NotFound` means the CI system has not discovered
    /// the pull request branch yet.
    async fn trigger_job(&self, job: &str, issue: u64) -> CollaboratorResult<()>;

    /// Ask the CI system to rediscover branches of `job`.
    async fn request_rescan(&self, job: &str) -> CollaboratorResult<()>;
}

/// Remaining GitHub API budget
#[async_trait]
pub trait RateLimitProbe: Send + Sync {
    async fn rate_limit_remaining(&self) -> CollaboratorResult<u32>;
}
