//! Backlog sweep for the label bot
//!
//! Walks the open issues newest first, picks the unlabeled ones that have
//! comments, and collects every `add` / `update` request addressed to the
//! bot by someone allowed to make it. Each issue then gets the known labels
//! among those requests in one call. At most `limit` issues are labeled per
//! run.
//!
//! The sweep is silent: it never comments. The webhook path is the one that
//! talks back to users.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::authorization::authorize;
use crate::collaborators::{IssueTracker, LabelStore, OpenIssue, TeamDirectory};
use crate::command::{ActionKind, CommandParser, ParseOutcome};
use crate::config::{BotProfile, ValidityPolicy, DEFAULT_SWEEP_LIMIT};
use crate::error::BotError;
use crate::validity::{apply_validity, KnownSet, ValidityVerdict};

/// What the sweep did to one issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweptIssue {
    pub issue: u64,
    /// Labels applied (or attempted)
    pub labels: Vec<String>,
    /// Requested labels the repository does not have
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored: Vec<String>,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Unlabeled issues whose comments were read
    pub scanned: usize,
    pub issues: Vec<SweptIssue>,
}

impl SweepReport {
    /// Issues whose label request could not be applied.
    pub fn failed(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| !i.applied && i.detail.is_some())
            .count()
    }
}

struct LabelRequest {
    issue: u64,
    labels: Vec<String>,
}

pub struct LabelSweep {
    parser: CommandParser,
    bot_login: String,
    tracker: Arc<dyn IssueTracker>,
    store: Arc<dyn LabelStore>,
    directory: Arc<dyn TeamDirectory>,
    limit: usize,
}

impl LabelSweep {
    pub fn new(
        profile: &BotProfile,
        tracker: Arc<dyn IssueTracker>,
        store: Arc<dyn LabelStore>,
        directory: Arc<dyn TeamDirectory>,
    ) -> Self {
        Self {
            parser: profile.parser(),
            bot_login: profile.bot_login.clone(),
            tracker,
            store,
            directory,
            limit: DEFAULT_SWEEP_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub async fn run(&self) -> Result<SweepReport, BotError> {
        let known = KnownSet::new(
            self.store
                .list_labels()
                .await
                .map_err(|e| BotError::Execution(format!("unable to gather labels: {}", e)))?,
        );
        if known.is_empty() {
            return Err(BotError::Execution("no labels available".into()));
        }

        let (scanned, requests) = self.find_requests().await?;
        info!(scanned, requests = requests.len(), "Collected label requests");

        let mut report = SweepReport {
            scanned,
            issues: Vec::with_capacity(requests.len()),
        };

        for request in requests {
            let (labels, ignored) =
                match apply_validity(&ValidityPolicy::Lenient, &request.labels, &known) {
                    ValidityVerdict::Actionable { arguments, dropped } => (arguments, dropped),
                    // Lenient never rejects.
                    ValidityVerdict::Rejected { requested, .. } => (Vec::new(), requested),
                };

            if labels.is_empty() {
                debug!(issue = request.issue, ignored = ?ignored, "No requested label exists");
                report.issues.push(SweptIssue {
                    issue: request.issue,
                    labels,
                    ignored,
                    applied: false,
                    detail: None,
                });
                continue;
            }

            match self.store.add_labels(request.issue, &labels).await {
                Ok(()) => {
                    info!(issue = request.issue, labels = ?labels, "Labeled issue");
                    report.issues.push(SweptIssue {
                        issue: request.issue,
                        labels,
                        ignored,
                        applied: true,
                        detail: None,
                    });
                }
                Err(e) => {
                    let systemic = e.is_systemic();
                    report.issues.push(SweptIssue {
                        issue: request.issue,
                        labels,
                        ignored,
                        applied: false,
                        detail: Some(e.to_string()),
                    });
                    if systemic {
                        error!(issue = request.issue, error = %e, "Label store unavailable, stopping sweep");
                        break;
                    }
                    warn!(issue = request.issue, error = %e, "Failed to label issue");
                }
            }
        }

        Ok(report)
    }

    /// Page through open issues until `limit` requests are found or the
    /// pages run out.
    async fn find_requests(&self) -> Result<(usize, Vec<LabelRequest>), BotError> {
        let mut requests = Vec::new();
        let mut scanned = 0;
        let mut page = 1;

        'pages: loop {
            let issues = self
                .tracker
                .list_open_issues(page)
                .await
                .map_err(|e| BotError::Execution(format!("unable to list open issues: {}", e)))?;
            if issues.is_empty() {
                break;
            }

            for issue in issues {
                if requests.len() >= self.limit {
                    break 'pages;
                }
                if !issue.labels.is_empty() || issue.comments == 0 {
                    continue;
                }
                scanned += 1;

                let labels = self.requested_labels(&issue).await?;
                if !labels.is_empty() {
                    requests.push(LabelRequest {
                        issue: issue.number,
                        labels,
                    });
                }
            }
            page += 1;
        }

        Ok((scanned, requests))
    }

    async fn requested_labels(&self, issue: &OpenIssue) -> Result<Vec<String>, BotError> {
        let comments = match self.tracker.list_comments(issue.number).await {
            Ok(comments) => comments,
            Err(e) if e.is_systemic() => {
                return Err(BotError::Execution(format!(
                    "unable to read comments of #{}: {}",
                    issue.number, e
                )))
            }
            Err(e) => {
                warn!(issue = issue.number, error = %e, "Skipping issue, comments unavailable");
                return Ok(Vec::new());
            }
        };

        let mut labels: Vec<String> = Vec::new();
        for comment in comments {
            if comment.author.eq_ignore_ascii_case(&self.bot_login) {
                continue;
            }
            let arguments = match self.parser.parse(&comment.body) {
                ParseOutcome::Parsed {
                    action: ActionKind::Add | ActionKind::Update,
                    arguments,
                } => arguments,
                _ => continue,
            };

            let decision = authorize(&comment.author, &issue.author, self.directory.as_ref()).await;
            if !decision.authorized {
                debug!(issue = issue.number, user = %comment.author, "Ignoring request from unauthorized user");
                continue;
            }

            for label in arguments {
                if !labels.contains(&label) {
                    labels.push(label);
                }
            }
        }

        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{CollaboratorResult, IssueNote};
    use crate::error::CollaboratorError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Tracker {
        pages: Vec<Vec<OpenIssue>>,
        comments: HashMap<u64, Vec<IssueNote>>,
        page_calls: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl IssueTracker for Tracker {
        async fn list_open_issues(&self, page: u32) -> CollaboratorResult<Vec<OpenIssue>> {
            self.page_calls.lock().unwrap().push(page);
            Ok(self
                .pages
                .get(page as usize - 1)
                .cloned()
                .unwrap_or_default())
        }

        async fn list_comments(&self, issue: u64) -> CollaboratorResult<Vec<IssueNote>> {
            Ok(self.comments.get(&issue).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct Repo {
        labels: Vec<String>,
        committers: Vec<String>,
        add_error: Option<CollaboratorError>,
        added: Mutex<Vec<(u64, Vec<String>)>>,
    }

    #[async_trait]
    impl LabelStore for Repo {
        async fn list_labels(&self) -> CollaboratorResult<Vec<String>> {
            Ok(self.labels.clone())
        }
        async fn add_labels(&self, issue: u64, labels: &[String]) -> CollaboratorResult<()> {
            self.added.lock().unwrap().push((issue, labels.to_vec()));
            match &self.add_error {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }
        async fn remove_label(&self, _issue: u64, _label: &str) -> CollaboratorResult<()> {
            Ok(())
        }
        async fn update_labels(&self, _issue: u64, _labels: &[String]) -> CollaboratorResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl TeamDirectory for Repo {
        async fn is_privileged_member(&self, login: &str) -> CollaboratorResult<bool> {
            Ok(self.committers.iter().any(|c| c == login))
        }
    }

    fn issue(number: u64, labels: &[&str], comments: u64) -> OpenIssue {
        OpenIssue {
            number,
            author: "reporter".into(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            comments,
        }
    }

    fn note(author: &str, body: &str) -> IssueNote {
        IssueNote {
            author: author.into(),
            body: body.into(),
        }
    }

    fn repo() -> Repo {
        Repo {
            labels: vec!["Bug".into(), "Doc".into(), "Operator".into()],
            committers: vec!["committer".into()],
            ..Default::default()
        }
    }

    fn sweep(tracker: Tracker, repo: Arc<Repo>) -> LabelSweep {
        LabelSweep::new(
            &BotProfile::label_bot(),
            Arc::new(tracker),
            repo.clone(),
            repo,
        )
    }

    #[tokio::test]
    async fn test_labels_unlabeled_issues_in_one_call() {
        let mut tracker = Tracker {
            pages: vec![vec![issue(3, &[], 2), issue(2, &["Bug"], 1), issue(1, &[], 0)]],
            ..Default::default()
        };
        tracker.comments.insert(
            3,
            vec![
                note("reporter", "@mxnet-label-bot add [bug, nonsense]"),
                note("committer", "@mxnet-label-bot, update [Operator]"),
            ],
        );
        let repo = Arc::new(repo());

        let report = sweep(tracker, repo.clone()).run().await.unwrap();

        assert_eq!(report.scanned, 1);
        assert_eq!(
            *repo.added.lock().unwrap(),
            vec![(3, vec!["Bug".to_string(), "Operator".to_string()])]
        );
        assert!(report.issues[0].applied);
        assert_eq!(report.issues[0].ignored, vec!["nonsense"]);
        assert_eq!(report.failed(), 0);
    }

    #[tokio::test]
    async fn test_ignores_outsiders_removals_and_the_bot() {
        let mut tracker = Tracker {
            pages: vec![vec![issue(9, &[], 3)]],
            ..Default::default()
        };
        tracker.comments.insert(
            9,
            vec![
                note("drive-by", "@mxnet-label-bot add [bug]"),
                note("reporter", "@mxnet-label-bot remove [doc]"),
                note("mxnet-label-bot", "@mxnet-label-bot add [doc]"),
            ],
        );
        let repo = Arc::new(repo());

        let report = sweep(tracker, repo.clone()).run().await.unwrap();

        assert_eq!(report.scanned, 1);
        assert!(report.issues.is_empty());
        assert!(repo.added.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stops_at_limit() {
        let mut tracker = Tracker {
            pages: vec![
                vec![issue(5, &[], 1), issue(4, &[], 1)],
                vec![issue(3, &[], 1)],
            ],
            ..Default::default()
        };
        for number in [5, 4, 3] {
            tracker
                .comments
                .insert(number, vec![note("reporter", "@mxnet-label-bot add [doc]")]);
        }
        let repo = Arc::new(repo());

        let report = sweep(tracker, repo.clone()).with_limit(2).run().await.unwrap();

        let labeled: Vec<u64> = report.issues.iter().map(|i| i.issue).collect();
        assert_eq!(labeled, vec![5, 4]);
        assert_eq!(repo.added.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_walks_every_page() {
        let mut tracker = Tracker {
            pages: vec![vec![issue(2, &["Doc"], 1)], vec![issue(1, &[], 1)]],
            ..Default::default()
        };
        tracker
            .comments
            .insert(1, vec![note("reporter", "@mxnet-label-bot add [doc]")]);
        let tracker_pages = Arc::new(tracker);
        let repo = Arc::new(repo());
        let sweep = LabelSweep::new(
            &BotProfile::label_bot(),
            tracker_pages.clone(),
            repo.clone(),
            repo.clone(),
        );

        let report = sweep.run().await.unwrap();

        assert_eq!(report.issues[0].issue, 1);
        assert_eq!(*tracker_pages.page_calls.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_unknown_labels_only_are_not_applied() {
        let mut tracker = Tracker {
            pages: vec![vec![issue(8, &[], 1)]],
            ..Default::default()
        };
        tracker
            .comments
            .insert(8, vec![note("reporter", "@mxnet-label-bot add [nonsense]")]);
        let repo = Arc::new(repo());

        let report = sweep(tracker, repo.clone()).run().await.unwrap();

        assert!(!report.issues[0].applied);
        assert_eq!(report.failed(), 0);
        assert!(repo.added.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_store_stops_the_sweep() {
        let mut tracker = Tracker {
            pages: vec![vec![issue(5, &[], 1), issue(4, &[], 1)]],
            ..Default::default()
        };
        for number in [5, 4] {
            tracker
                .comments
                .insert(number, vec![note("reporter", "@mxnet-label-bot add [bug]")]);
        }
        let repo = Arc::new(Repo {
            add_error: Some(CollaboratorError::Unavailable("connection refused".into())),
            ..repo()
        });

        let report = sweep(tracker, repo.clone()).run().await.unwrap();

        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(repo.added.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_against_github_api() {
        use crate::config::{GitHubConfig, RepoRef};
        use crate::github::GitHubClient;
        use crate::secrets::Credentials;
        use httpmock::prelude::*;

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/apache/incubator-mxnet/labels");
            then.status(200)
                .json_body(serde_json::json!([{ "name": "Bug" }, { "name": "Doc" }]));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/repos/apache/incubator-mxnet/issues")
                .query_param("page", "1");
            then.status(200).json_body(serde_json::json!([
                { "number": 21, "user": { "login": "reporter" }, "labels": [], "comments": 1 },
                { "number": 20, "user": { "login": "reporter" }, "labels": [{ "name": "Doc" }], "comments": 4 }
            ]));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/repos/apache/incubator-mxnet/issues")
                .query_param("page", "2");
            then.status(200).json_body(serde_json::json!([]));
        });
        let comments = server.mock(|when, then| {
            when.method(GET)
                .path("/repos/apache/incubator-mxnet/issues/21/comments");
            then.status(200).json_body(serde_json::json!([
                { "user": { "login": "reporter" }, "body": "@mxnet-label-bot add [BUG]" }
            ]));
        });
        let add = server.mock(|when, then| {
            when.method(POST)
                .path("/repos/apache/incubator-mxnet/issues/21/labels")
                .body_includes("\"Bug\"");
            then.status(200).json_body(serde_json::json!([]));
        });

        let config = GitHubConfig::new(RepoRef::parse("apache/incubator-mxnet").unwrap())
            .with_api_url(server.base_url());
        let github = Arc::new(
            GitHubClient::new(config, Credentials::new("mxnet-label-bot", "token")).unwrap(),
        );
        let sweep = LabelSweep::new(
            &BotProfile::label_bot(),
            github.clone(),
            github.clone(),
            github,
        );

        let report = sweep.run().await.unwrap();

        assert_eq!(report.scanned, 1);
        assert_eq!(report.issues[0].labels, vec!["Bug"]);
        assert!(report.issues[0].applied);
        comments.assert_calls(1);
        add.assert_calls(1);
    }

    #[tokio::test]
    async fn test_empty_label_set_is_an_execution_error() {
        let repo = Arc::new(Repo::default());
        let err = sweep(Tracker::default(), repo).run().await.unwrap_err();
        assert_eq!(err, BotError::Execution("no labels available".into()));
    }
}
