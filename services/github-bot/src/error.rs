//! Error taxonomy for the webhook command pipeline.

use thiserror::Error;

/// Classified failure of one webhook invocation.
///
/// Every stage of the pipeline either narrows its input or stops with one of
/// these. `UnsupportedEvent` and `SelfTrigger` are silent terminations; all
/// other variants are real failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BotError {
    /// Signature missing or not matching the shared secret
    #[error("Webhook security check failed: {0}")]
    Security(String),

    /// Body or envelope could not be decoded
    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    /// Event type (or event action) the bots do not handle
    #[error("Unsupported GitHub event: {0}")]
    UnsupportedEvent(String),

    /// Comment was written by the bot itself
    #[error("Ignoring comment posted by the bot account {0}")]
    SelfTrigger(String),

    /// Unrecognized action or empty argument list
    #[error("Invalid command syntax: {0}")]
    Syntax(String),

    /// None of the requested arguments are known
    #[error("No supported arguments: {0}")]
    Validation(String),

    /// Comment author may not run the command
    #[error("Unauthorized: {0}")]
    Authorization(String),

    /// Downstream system failed as a whole
    #[error("Execution failed: {0}")]
    Execution(String),

    /// GitHub API budget below the configured floor
    #[error("Skipped, GitHub API rate limit too low: {0}")]
    RateLimited(String),
}

impl BotError {
    /// Whether the invocation should be surfaced as a failure to the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BotError::UnsupportedEvent(_) | BotError::SelfTrigger(_))
    }

    /// HTTP-equivalent status reported to the invoking infrastructure.
    pub fn status_code(&self) -> u16 {
        match self {
            BotError::Security(_) => 401,
            BotError::MalformedPayload(_) => 400,
            BotError::UnsupportedEvent(_) | BotError::SelfTrigger(_) => 200,
            BotError::Syntax(_) | BotError::Validation(_) => 422,
            BotError::Authorization(_) => 403,
            BotError::Execution(_) => 502,
            BotError::RateLimited(_) => 503,
        }
    }

    /// Short machine-readable class name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BotError::Security(_) => "security",
            BotError::MalformedPayload(_) => "malformed_payload",
            BotError::UnsupportedEvent(_) => "unsupported_event",
            BotError::SelfTrigger(_) => "self_trigger",
            BotError::Syntax(_) => "syntax",
            BotError::Validation(_) => "validation",
            BotError::Authorization(_) => "authorization",
            BotError::Execution(_) => "execution",
            BotError::RateLimited(_) => "rate_limited",
        }
    }
}

/// Failure reported by an external collaborator (GitHub, Jenkins, team lookup).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The service could not be reached at all (connect failure, timeout)
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The addressed resource does not exist (yet)
    #[error("not found: {0}")]
    NotFound(String),

    /// The service refused this one request
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl CollaboratorError {
    /// Classify a non-success HTTP status.
    ///
    /// Any answer, 5xx included, proves the service is reachable, so only
    /// `404` is singled out and everything else rejects this one request.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => CollaboratorError::NotFound(message),
            _ => CollaboratorError::Rejected { status, message },
        }
    }

    /// Systemic failures abort a whole batch rather than a single item.
    pub fn is_systemic(&self) -> bool {
        matches!(self, CollaboratorError::Unavailable(_))
    }
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        CollaboratorError::Unavailable(err.to_string())
    }
}
