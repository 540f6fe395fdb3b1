//! Response reporter: user-facing comments on the originating issue.

use std::sync::Arc;

use tracing::{info, warn};

use crate::collaborators::CommentPoster;
use crate::command::{ActionKind, SyntaxRejection};
use crate::config::{BotKind, BotProfile};
use crate::executor::ExecutionOutcome;

/// Best-effort comment poster
#[derive(Clone)]
pub struct ResponseReporter {
    poster: Arc<dyn CommentPoster>,
}

impl ResponseReporter {
    pub fn new(poster: Arc<dyn CommentPoster>) -> Self {
        Self { poster }
    }

    /// Post `message` on `issue`. Failures are logged and reported as `false`,
    /// never retried.
    pub async fn report(&self, issue: u64, message: &str) -> bool {
        match self.poster.post_comment(issue, message).await {
            Ok(()) => {
                info!(issue, "Posted response comment");
                true
            }
            Err(e) => {
                warn!(issue, error = %e, "Failed to post response comment");
                false
            }
        }
    }
}

/// A comment addressed to the bot that is not a valid command.
///
/// An unknown action gets the bot's help text. A known action with nothing
/// in brackets says so first and shows the shape of the command.
pub fn syntax_message(profile: &BotProfile, rejection: &SyntaxRejection) -> String {
    match rejection {
        SyntaxRejection::UnknownAction { .. } => profile.help_text.clone(),
        SyntaxRejection::EmptyArguments { action } => format!(
            "No {noun} given for '{action}'. \n\
             List the {noun} in brackets, for example : {mention} {action} [{example}]",
            noun = profile.argument_noun,
            action = action,
            mention = profile.mention,
            example = match profile.kind {
                BotKind::LabelBot => "bug, enhancement",
                BotKind::CiBot => "centos-cpu",
            },
        ),
    }
}

/// The known set does not contain anything requested (strict policy).
pub fn unsupported_message(profile: &BotProfile, requested: &[String], supported: &[String]) -> String {
    format!(
        "None of the {noun} entered are supported. \n\
         {Noun} entered by user: {requested} \n\
         Supported {noun}: {supported}",
        noun = profile.argument_noun,
        Noun = capitalize(profile.argument_noun),
        requested = requested.join(", "),
        supported = supported.join(", "),
    )
}

/// Lenient policy dropped every requested argument.
pub fn nothing_matched_message(profile: &BotProfile, dropped: &[String]) -> String {
    format!(
        "None of the {} entered exist in this repository: {}",
        profile.argument_noun,
        dropped.join(", ")
    )
}

/// Summary of an executed batch.
pub fn outcome_message(
    profile: &BotProfile,
    action: ActionKind,
    outcomes: &[ExecutionOutcome],
    dropped: &[String],
) -> String {
    let succeeded: Vec<&str> = outcomes
        .iter()
        .filter(|o| o.succeeded)
        .map(|o| o.argument.as_str())
        .collect();
    let failed: Vec<String> = outcomes
        .iter()
        .filter(|o| !o.succeeded)
        .map(describe_failure)
        .collect();

    let mut lines = Vec::new();
    match profile.kind {
        BotKind::CiBot if succeeded.is_empty() => {
            lines.push("Authorized user recognized. However, the bot is unable to trigger CI.".to_string());
        }
        BotKind::CiBot => {
            lines.push("Jenkins CI successfully triggered.".to_string());
            lines.push(format!("Triggered jobs: {}", succeeded.join(", ")));
        }
        BotKind::LabelBot if succeeded.is_empty() => {
            lines.push(format!("Unable to {} labels.", action));
        }
        BotKind::LabelBot => {
            lines.push(format!("Successfully {} labels: {}", past_tense(action), succeeded.join(", ")));
        }
    }

    if !failed.is_empty() {
        lines.push(format!("Failed: {}", failed.join(", ")));
    }
    if !dropped.is_empty() {
        lines.push(format!("Ignored unknown {}: {}", profile.argument_noun, dropped.join(", ")));
    }

    lines.join(" \n")
}

/// The backend became unreachable part way through.
pub fn partial_message(profile: &BotProfile, completed: &[ExecutionOutcome]) -> String {
    let done: Vec<&str> = completed
        .iter()
        .filter(|o| o.succeeded)
        .map(|o| o.argument.as_str())
        .collect();
    match profile.kind {
        BotKind::CiBot => format!(
            "Authorized user recognized. However, the bot is unable to trigger CI. \n\
             Jobs triggered before the failure: {}",
            done.join(", ")
        ),
        BotKind::LabelBot => format!(
            "The label service became unavailable. \nLabels applied before the failure: {}",
            done.join(", ")
        ),
    }
}

fn describe_failure(outcome: &ExecutionOutcome) -> String {
    match &outcome.detail {
        Some(detail) => format!("{} ({})", outcome.argument, detail),
        None => outcome.argument.clone(),
    }
}

fn past_tense(action: ActionKind) -> &'static str {
    match action {
        ActionKind::Add => "added",
        ActionKind::Remove => "removed",
        ActionKind::Update => "updated",
        ActionKind::Trigger => "triggered",
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
