//! The webhook command pipeline
//!
//! One [`CommandPipeline`] per bot. Each call to [`CommandPipeline::run`]
//! takes a single delivery through every stage:
//!
//! 1. signature check against the webhook secret
//! 2. payload extraction (event filter, self-trigger guard)
//! 3. command parsing
//! 4. validity gate against a freshly fetched known set
//! 5. authorization gate
//! 6. execution
//! 7. result comment
//!
//! A stage either narrows its input for the next one or stops the
//! invocation with a [`BotError`]. Syntax, validity and authorization
//! rejections are commented on the issue before stopping.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::authorization::{authorize, AuthorizationDecision};
use crate::collaborators::TeamDirectory;
use crate::command::{Command, CommandParser, ParseOutcome};
use crate::config::BotProfile;
use crate::envelope::{extract_issue_comment, IssueComment, WebhookEnvelope};
use crate::error::BotError;
use crate::executor::{Backend, ExecutionOutcome};
use crate::reporter::{self, ResponseReporter};
use crate::signature::verify_signature;
use crate::validity::{apply_validity, ValidityVerdict};

/// Status and summary handed back to whatever invoked the bot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResponse {
    pub status: u16,
    pub summary: String,
}

impl InvocationResponse {
    pub fn new(status: u16, summary: impl Into<String>) -> Self {
        Self {
            status,
            summary: summary.into(),
        }
    }

    pub fn ok(summary: impl Into<String>) -> Self {
        Self::new(200, summary)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl From<&BotError> for InvocationResponse {
    fn from(err: &BotError) -> Self {
        Self::new(err.status_code(), err.to_string())
    }
}

/// How a successful invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The comment does not mention the bot
    NotAddressed { issue: u64 },
    /// Nothing requested is known; nothing was executed
    NothingMatched { issue: u64, dropped: Vec<String> },
    /// The command ran; `reported` tells whether the result comment was posted
    Executed {
        command: Command,
        authorization: AuthorizationDecision,
        outcomes: Vec<ExecutionOutcome>,
        reported: bool,
    },
}

impl PipelineOutcome {
    pub fn summary(&self) -> String {
        match self {
            PipelineOutcome::NotAddressed { issue } => {
                format!("Comment on #{} is not addressed to the bot", issue)
            }
            PipelineOutcome::NothingMatched { issue, dropped } => {
                format!("No known arguments on #{} (ignored: {})", issue, dropped.join(", "))
            }
            PipelineOutcome::Executed {
                command, outcomes, ..
            } => {
                let succeeded = outcomes.iter().filter(|o| o.succeeded).count();
                format!(
                    "{} on #{}: {}/{} succeeded",
                    command.action,
                    command.target_issue,
                    succeeded,
                    outcomes.len()
                )
            }
        }
    }
}

/// Command pipeline specialized for one bot
pub struct CommandPipeline {
    profile: BotProfile,
    parser: CommandParser,
    webhook_secret: String,
    backend: Backend,
    directory: Arc<dyn TeamDirectory>,
    reporter: ResponseReporter,
}

impl CommandPipeline {
    pub fn new(
        profile: BotProfile,
        webhook_secret: impl Into<String>,
        backend: Backend,
        directory: Arc<dyn TeamDirectory>,
        reporter: ResponseReporter,
    ) -> Self {
        Self {
            parser: profile.parser(),
            profile,
            webhook_secret: webhook_secret.into(),
            backend,
            directory,
            reporter,
        }
    }

    pub fn profile(&self) -> &BotProfile {
        &self.profile
    }

    /// Process one delivery and map the result onto the response contract.
    pub async fn run(&self, envelope: &WebhookEnvelope) -> InvocationResponse {
        match self.process(envelope).await {
            Ok(outcome) => {
                let summary = outcome.summary();
                info!(bot = %self.profile.kind, summary = %summary, "Invocation complete");
                InvocationResponse::ok(summary)
            }
            Err(e) if !e.is_fatal() => {
                info!(bot = %self.profile.kind, reason = %e, "Invocation ignored");
                InvocationResponse::from(&e)
            }
            Err(e) => {
                error!(bot = %self.profile.kind, kind = e.kind(), error = %e, "Invocation failed");
                InvocationResponse::from(&e)
            }
        }
    }

    /// Check the delivery's signature against the webhook secret.
    pub fn authenticate(&self, envelope: &WebhookEnvelope) -> Result<(), BotError> {
        if verify_signature(
            envelope.body.as_bytes(),
            envelope.signature(),
            &self.webhook_secret,
        )? {
            Ok(())
        } else {
            Err(BotError::Security("signature mismatch".into()))
        }
    }

    pub async fn process(&self, envelope: &WebhookEnvelope) -> Result<PipelineOutcome, BotError> {
        self.authenticate(envelope)?;

        let comment = extract_issue_comment(envelope, &self.profile.bot_login)?;
        let issue = comment.issue_number;

        let command = match self.parser.parse(&comment.comment_body) {
            ParseOutcome::NotAddressed => return Ok(PipelineOutcome::NotAddressed { issue }),
            ParseOutcome::Rejected(rejection) => {
                warn!(issue, user = %comment.comment_author, reason = %rejection, "Rejected command");
                let message = reporter::syntax_message(&self.profile, &rejection);
                self.reporter.report(issue, &message).await;
                return Err(BotError::Syntax(rejection.to_string()));
            }
            parsed => match parsed.into_command(issue) {
                Some(command) => command,
                None => return Ok(PipelineOutcome::NotAddressed { issue }),
            },
        };
        info!(issue, action = %command.action, arguments = ?command.arguments, "Parsed command");

        let known = self.backend.known_set().await.map_err(|e| {
            BotError::Execution(format!(
                "unable to gather {} for #{}: {}",
                self.profile.argument_noun, issue, e
            ))
        })?;
        if known.is_empty() {
            return Err(BotError::Execution(format!(
                "no {} available",
                self.profile.argument_noun
            )));
        }

        let (arguments, dropped) = match apply_validity(&self.profile.validity, &command.arguments, &known) {
            ValidityVerdict::Rejected {
                requested,
                supported,
            } => {
                let message = reporter::unsupported_message(&self.profile, &requested, &supported);
                self.reporter.report(issue, &message).await;
                return Err(BotError::Validation(format!(
                    "requested {}: {}",
                    self.profile.argument_noun,
                    requested.join(", ")
                )));
            }
            ValidityVerdict::Actionable { arguments, dropped } if arguments.is_empty() => {
                info!(issue, dropped = ?dropped, "No requested argument is known");
                let message = reporter::nothing_matched_message(&self.profile, &dropped);
                self.reporter.report(issue, &message).await;
                return Ok(PipelineOutcome::NothingMatched { issue, dropped });
            }
            ValidityVerdict::Actionable { arguments, dropped } => (arguments, dropped),
        };
        let command = command.with_arguments(arguments);

        let authorization = self.authorize(&comment).await;
        if !authorization.authorized {
            warn!(issue, user = %comment.comment_author, "Unauthorized command");
            self.reporter.report(issue, &self.profile.denial_text).await;
            return Err(BotError::Authorization(format!(
                "{} may not run commands on #{}",
                comment.comment_author, issue
            )));
        }

        match self.backend.execute(&command).await {
            Ok(outcomes) => {
                let message = reporter::outcome_message(&self.profile, command.action, &outcomes, &dropped);
                let reported = self.reporter.report(issue, &message).await;
                Ok(PipelineOutcome::Executed {
                    command,
                    authorization,
                    outcomes,
                    reported,
                })
            }
            Err(failure) => {
                if !failure.completed.is_empty() {
                    let message = reporter::partial_message(&self.profile, &failure.completed);
                    self.reporter.report(issue, &message).await;
                }
                Err(BotError::Execution(failure.reason))
            }
        }
    }

    async fn authorize(&self, comment: &IssueComment) -> AuthorizationDecision {
        authorize(
            &comment.comment_author,
            &comment.issue_author,
            self.directory.as_ref(),
        )
        .await
    }
}
