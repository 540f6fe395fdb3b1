//! Webhook envelope and payload extraction
//!
//! Deliveries reach the bots either directly over HTTP or forwarded through a
//! queue. Both paths end up as a [`WebhookEnvelope`]: the delivery headers
//! plus the raw body exactly as GitHub signed it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::BotError;
use crate::signature::SIGNATURE_HEADER;

/// Header naming the GitHub event type
pub const EVENT_HEADER: &str = "X-GitHub-Event";

/// The only event type the bots act on
pub const ISSUE_COMMENT_EVENT: &str = "issue_comment";

/// Headers and raw body of one webhook delivery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl WebhookEnvelope {
    pub fn new(headers: BTreeMap<String, String>, body: impl Into<String>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn event_type(&self) -> Option<&str> {
        self.header(EVENT_HEADER)
    }

    pub fn signature(&self) -> Option<&str> {
        self.header(SIGNATURE_HEADER)
    }
}

/// Queue batch as delivered to the consumer: `{"Records": [{"body": ...}]}`
#[derive(Debug, Deserialize)]
struct QueueBatch {
    #[serde(rename = "Records")]
    records: Vec<QueueRecord>,
}

#[derive(Debug, Deserialize)]
struct QueueRecord {
    body: String,
}

/// Unwrap a forwarded queue batch into one envelope per record.
pub fn parse_queued_message(text: &str) -> Result<Vec<WebhookEnvelope>, BotError> {
    let batch: QueueBatch = serde_json::from_str(text)
        .map_err(|e| BotError::MalformedPayload(format!("invalid queue message: {}", e)))?;

    if batch.records.is_empty() {
        return Err(BotError::MalformedPayload("queue message has no records".into()));
    }

    batch
        .records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            serde_json::from_str::<WebhookEnvelope>(&record.body).map_err(|e| {
                BotError::MalformedPayload(format!("invalid envelope in record {}: {}", index, e))
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct IssueCommentPayload {
    #[serde(default)]
    action: Option<String>,
    issue: IssuePayload,
    comment: CommentPayload,
    #[serde(default)]
    repository: Option<RepositoryPayload>,
}

#[derive(Debug, Deserialize)]
struct IssuePayload {
    number: u64,
    user: UserPayload,
}

#[derive(Debug, Deserialize)]
struct CommentPayload {
    body: String,
    user: UserPayload,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryPayload {
    full_name: String,
}

/// The fields of an `issue_comment` event the pipeline works with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueComment {
    pub action: Option<String>,
    pub issue_number: u64,
    pub issue_author: String,
    pub comment_body: String,
    pub comment_author: String,
    pub repository: Option<String>,
}

/// Recover the issue comment carried by an envelope.
///
/// Only `issue_comment` events are accepted; deletions and other event types
/// terminate silently, as do comments written by `bot_login`.
pub fn extract_issue_comment(
    envelope: &WebhookEnvelope,
    bot_login: &str,
) -> Result<IssueComment, BotError> {
    let event = envelope
        .event_type()
        .ok_or_else(|| BotError::MalformedPayload(format!("missing {} header", EVENT_HEADER)))?;
    debug!(event = %event, "Extracting webhook payload");

    let value: serde_json::Value = serde_json::from_str(&envelope.body)
        .map_err(|e| BotError::MalformedPayload(format!("decoding JSON for payload failed: {}", e)))?;

    if event != ISSUE_COMMENT_EVENT {
        info!(event = %event, "GitHub event not handled by the bot");
        return Err(BotError::UnsupportedEvent(event.to_string()));
    }

    let payload: IssueCommentPayload = serde_json::from_value(value)
        .map_err(|e| BotError::MalformedPayload(format!("invalid issue_comment payload: {}", e)))?;

    if payload.action.as_deref() == Some("deleted") {
        info!(issue = payload.issue.number, "Comment deleted, ignoring");
        return Err(BotError::UnsupportedEvent(format!(
            "{}.deleted",
            ISSUE_COMMENT_EVENT
        )));
    }

    if payload.comment.user.login.eq_ignore_ascii_case(bot_login) {
        info!(issue = payload.issue.number, "Comment written by the bot, ignoring");
        return Err(BotError::SelfTrigger(payload.comment.user.login));
    }

    Ok(IssueComment {
        action: payload.action,
        issue_number: payload.issue.number,
        issue_author: payload.issue.user.login,
        comment_body: payload.comment.body,
        comment_author: payload.comment.user.login,
        repository: payload.repository.map(|r| r.full_name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(event: &str, body: serde_json::Value) -> WebhookEnvelope {
        let mut headers = BTreeMap::new();
        headers.insert("x-github-event".to_string(), event.to_string());
        WebhookEnvelope::new(headers, body.to_string())
    }

    fn comment_body(author: &str, text: &str) -> serde_json::Value {
        json!({
            "action": "created",
            "issue": { "number": 42, "user": { "login": "issue-author" } },
            "comment": { "body": text, "user": { "login": author } },
            "repository": { "full_name": "apache/incubator-mxnet" }
        })
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let env = envelope("issue_comment", json!({}));
        assert_eq!(env.header("X-GitHub-Event"), Some("issue_comment"));
        assert_eq!(env.event_type(), Some("issue_comment"));
        assert_eq!(env.signature(), None);
    }

    #[test]
    fn test_extracts_issue_comment() {
        let env = envelope(
            "issue_comment",
            comment_body("contributor", "@mxnet-label-bot add [bug]"),
        );
        let comment = extract_issue_comment(&env, "mxnet-label-bot").unwrap();

        assert_eq!(comment.issue_number, 42);
        assert_eq!(comment.issue_author, "issue-author");
        assert_eq!(comment.comment_author, "contributor");
        assert_eq!(comment.comment_body, "@mxnet-label-bot add [bug]");
        assert_eq!(comment.repository.as_deref(), Some("apache/incubator-mxnet"));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let mut headers = BTreeMap::new();
        headers.insert(EVENT_HEADER.to_string(), "issue_comment".to_string());
        let env = WebhookEnvelope::new(headers, "{not json");

        let err = extract_issue_comment(&env, "mxnet-ci-bot").unwrap_err();
        assert!(matches!(err, BotError::MalformedPayload(_)));
    }

    #[test]
    fn test_missing_comment_body_is_malformed() {
        let env = envelope(
            "issue_comment",
            json!({
                "action": "created",
                "issue": { "number": 1, "user": { "login": "a" } },
                "comment": { "user": { "login": "b" } }
            }),
        );
        let err = extract_issue_comment(&env, "mxnet-ci-bot").unwrap_err();
        assert!(matches!(err, BotError::MalformedPayload(_)));
    }

    #[test]
    fn test_other_events_are_unsupported() {
        let env = envelope("check_suite", json!({ "action": "completed" }));
        let err = extract_issue_comment(&env, "mxnet-ci-bot").unwrap_err();
        assert_eq!(err, BotError::UnsupportedEvent("check_suite".into()));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_deleted_comments_are_ignored() {
        let mut body = comment_body("contributor", "@mxnet-ci-bot run [clang]");
        body["action"] = json!("deleted");
        let err = extract_issue_comment(&envelope("issue_comment", body), "mxnet-ci-bot").unwrap_err();
        assert!(matches!(err, BotError::UnsupportedEvent(_)));
    }

    #[test]
    fn test_self_trigger_guard() {
        let env = envelope(
            "issue_comment",
            comment_body("MXNet-CI-Bot", "@mxnet-ci-bot run [clang]"),
        );
        let err = extract_issue_comment(&env, "mxnet-ci-bot").unwrap_err();
        assert_eq!(err, BotError::SelfTrigger("MXNet-CI-Bot".into()));
    }

    #[test]
    fn test_parse_queued_message() {
        let inner = json!({
            "headers": { "X-GitHub-Event": "issue_comment", "X-Hub-Signature": "sha1=00" },
            "body": "{\"action\":\"created\"}"
        });
        let batch = json!({ "Records": [ { "body": inner.to_string() } ] });

        let envelopes = parse_queued_message(&batch.to_string()).unwrap();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].event_type(), Some("issue_comment"));
        assert_eq!(envelopes[0].signature(), Some("sha1=00"));
        assert_eq!(envelopes[0].body, "{\"action\":\"created\"}");
    }

    #[test]
    fn test_parse_queued_message_rejects_garbage() {
        assert!(matches!(
            parse_queued_message("[]"),
            Err(BotError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_queued_message(r#"{"Records": []}"#),
            Err(BotError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_queued_message(r#"{"Records": [{"body": "nope"}]}"#),
            Err(BotError::MalformedPayload(_))
        ));
    }
}
