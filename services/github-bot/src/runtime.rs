//! Wiring of a bot to its real collaborators, plus the invocation entry
//! point shared by the queue consumer and the HTTP gateway.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::collaborators::RateLimitProbe;
use crate::config::{BotKind, BotProfile, RuntimeArgs};
use crate::envelope::WebhookEnvelope;
use crate::error::BotError;
use crate::executor::Backend;
use crate::github::GitHubClient;
use crate::jenkins::JenkinsClient;
use crate::pipeline::{CommandPipeline, InvocationResponse};
use crate::reporter::ResponseReporter;
use crate::secrets::{BotSecrets, EnvSecretProvider, SecretProvider};
use crate::sweep::{LabelSweep, SweepReport};

/// A ready-to-run bot
pub struct BotRuntime {
    pipeline: CommandPipeline,
    sweep: Option<LabelSweep>,
    rate_limit: Option<Arc<dyn RateLimitProbe>>,
    min_rate_limit: u32,
}

impl BotRuntime {
    /// Build a bot of `kind` talking to GitHub (and Jenkins for the CI bot).
    pub fn build(kind: BotKind, args: &RuntimeArgs, secrets: &BotSecrets) -> Result<Self> {
        let github = Arc::new(
            GitHubClient::new(args.github_config()?, secrets.github.clone())
                .context("Failed to create GitHub client")?,
        );

        let bot_login = args
            .bot_login
            .clone()
            .unwrap_or_else(|| secrets.github.user.clone());
        let profile = BotProfile::for_kind(kind).with_bot_login(bot_login);

        let backend = match kind {
            BotKind::LabelBot => Backend::Labels(github.clone()),
            BotKind::CiBot => Backend::Ci(Arc::new(
                JenkinsClient::new(args.jenkins_config(), secrets.jenkins.clone())
                    .context("Failed to create Jenkins client")?,
            )),
        };

        info!(
            bot = %kind,
            repo = %args.repo,
            login = %profile.bot_login,
            "Bot configured"
        );

        let sweep = match kind {
            BotKind::LabelBot => Some(
                LabelSweep::new(&profile, github.clone(), github.clone(), github.clone())
                    .with_limit(args.sweep_limit),
            ),
            BotKind::CiBot => None,
        };

        let pipeline = CommandPipeline::new(
            profile,
            secrets.webhook_secret.clone(),
            backend,
            github.clone(),
            ResponseReporter::new(github.clone()),
        );
        let runtime = Self::from_parts(pipeline, Some(github), args.min_rate_limit);
        Ok(match sweep {
            Some(sweep) => runtime.with_sweep(sweep),
            None => runtime,
        })
    }

    pub fn from_parts(
        pipeline: CommandPipeline,
        rate_limit: Option<Arc<dyn RateLimitProbe>>,
        min_rate_limit: u32,
    ) -> Self {
        Self {
            pipeline,
            sweep: None,
            rate_limit,
            min_rate_limit,
        }
    }

    pub fn with_sweep(mut self, sweep: LabelSweep) -> Self {
        self.sweep = Some(sweep);
        self
    }

    pub fn kind(&self) -> BotKind {
        self.pipeline.profile().kind
    }

    /// Run one delivery, skipping it when the GitHub API budget is low.
    ///
    /// Unsigned or forged deliveries are turned away before the budget is
    /// queried, so they cost no GitHub API call.
    pub async fn handle(&self, envelope: &WebhookEnvelope) -> InvocationResponse {
        if let Err(e) = self.pipeline.authenticate(envelope) {
            warn!(bot = %self.kind(), error = %e, "Rejected webhook delivery");
            return InvocationResponse::from(&e);
        }
        if let Err(e) = self.preflight().await {
            return InvocationResponse::from(&e);
        }
        self.pipeline.run(envelope).await
    }

    /// Label the backlog of unlabeled issues, under the same rate-limit floor.
    pub async fn sweep(&self) -> Result<SweepReport, BotError> {
        let Some(sweep) = &self.sweep else {
            return Err(BotError::UnsupportedEvent(format!(
                "{} has no issue sweep",
                self.kind()
            )));
        };
        self.preflight().await?;
        sweep.run().await
    }

    /// Run every delivery of a batch in order.
    pub async fn handle_batch(&self, envelopes: &[WebhookEnvelope]) -> Vec<InvocationResponse> {
        let mut responses = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            responses.push(self.handle(envelope).await);
        }
        responses
    }

    async fn preflight(&self) -> Result<(), BotError> {
        if self.min_rate_limit == 0 {
            return Ok(());
        }
        let Some(probe) = &self.rate_limit else {
            return Ok(());
        };

        match probe.rate_limit_remaining().await {
            Ok(remaining) if remaining < self.min_rate_limit => {
                warn!(remaining, floor = self.min_rate_limit, "GitHub API rate limit too low, skipping");
                Err(BotError::RateLimited(format!(
                    "{} remaining (minimum {})",
                    remaining, self.min_rate_limit
                )))
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Unable to query GitHub rate limit, continuing");
                Ok(())
            }
        }
    }
}

/// Fetch secrets from Secret Manager when a GCP project is configured,
/// otherwise from the environment.
pub async fn load_secrets(args: &RuntimeArgs) -> Result<BotSecrets> {
    match &args.gcp_project {
        #[cfg(feature = "gsm")]
        Some(project) => {
            let provider = crate::secrets::GsmSecretProvider::new(project, &args.secret_name).await?;
            provider.fetch().await
        }
        #[cfg(not(feature = "gsm"))]
        Some(project) => {
            warn!(project = %project, "Built without GSM support, reading secrets from the environment");
            EnvSecretProvider::new(args.secret_env.clone()).fetch().await
        }
        None => EnvSecretProvider::new(args.secret_env.clone()).fetch().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{CiTrigger, CollaboratorResult, CommentPoster, TeamDirectory};
    use crate::error::CollaboratorError;
    use crate::signature::sign;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Probe {
        remaining: CollaboratorResult<u32>,
        calls: Arc<AtomicUsize>,
    }

    impl Probe {
        fn new(remaining: CollaboratorResult<u32>) -> Self {
            Self {
                remaining,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl RateLimitProbe for Probe {
        async fn rate_limit_remaining(&self) -> CollaboratorResult<u32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.remaining.clone()
        }
    }

    #[derive(Default)]
    struct Quiet {
        triggers: AtomicUsize,
    }

    #[async_trait]
    impl CiTrigger for Quiet {
        async fn list_supported_jobs(&self) -> CollaboratorResult<Vec<String>> {
            Ok(vec!["clang".into()])
        }
        async fn trigger_job(&self, _job: &str, _issue: u64) -> CollaboratorResult<()> {
            self.triggers.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn request_rescan(&self, _job: &str) -> CollaboratorResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl CommentPoster for Quiet {
        async fn post_comment(&self, _issue: u64, _body: &str) -> CollaboratorResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl TeamDirectory for Quiet {
        async fn is_privileged_member(&self, _login: &str) -> CollaboratorResult<bool> {
            Ok(false)
        }
    }

    fn runtime(probe: Option<Probe>, floor: u32) -> BotRuntime {
        let quiet = Arc::new(Quiet::default());
        let pipeline = CommandPipeline::new(
            BotProfile::ci_bot(),
            "secret",
            Backend::Ci(quiet.clone()),
            quiet.clone(),
            ResponseReporter::new(quiet),
        );
        BotRuntime::from_parts(
            pipeline,
            probe.map(|p| Arc::new(p) as Arc<dyn RateLimitProbe>),
            floor,
        )
    }

    fn unsigned() -> WebhookEnvelope {
        let mut headers = BTreeMap::new();
        headers.insert("X-GitHub-Event".to_string(), "issue_comment".to_string());
        WebhookEnvelope::new(headers, "{}")
    }

    /// Signed `push` delivery: passes the signature check, then is ignored.
    fn signed_push() -> WebhookEnvelope {
        let body = "{}";
        let mut headers = BTreeMap::new();
        headers.insert("X-GitHub-Event".to_string(), "push".to_string());
        headers.insert(
            "X-Hub-Signature".to_string(),
            sign(body.as_bytes(), "secret").unwrap(),
        );
        WebhookEnvelope::new(headers, body)
    }

    #[tokio::test]
    async fn test_low_rate_limit_skips_invocation() {
        let bot = runtime(Some(Probe::new(Ok(12))), 4000);
        let response = bot.handle(&signed_push()).await;
        assert_eq!(response.status, 503);
        assert!(response.summary.contains("12 remaining"));
    }

    #[tokio::test]
    async fn test_enough_budget_runs_pipeline() {
        let bot = runtime(Some(Probe::new(Ok(4999))), 4000);
        // Reaches the event filter.
        assert_eq!(bot.handle(&signed_push()).await.status, 200);
    }

    #[tokio::test]
    async fn test_unsigned_delivery_does_not_query_rate_limit() {
        let probe = Probe::new(Ok(12));
        let calls = probe.calls.clone();
        let bot = runtime(Some(probe), 4000);

        assert_eq!(bot.handle(&unsigned()).await.status, 401);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_probe_failure_does_not_block() {
        let bot = runtime(
            Some(Probe::new(Err(CollaboratorError::Unavailable("down".into())))),
            4000,
        );
        assert_eq!(bot.handle(&signed_push()).await.status, 200);
    }

    #[tokio::test]
    async fn test_zero_floor_disables_preflight() {
        let probe = Probe::new(Ok(0));
        let calls = probe.calls.clone();
        let bot = runtime(Some(probe), 0);
        assert_eq!(bot.handle(&signed_push()).await.status, 200);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(bot.kind(), BotKind::CiBot);
    }

    #[tokio::test]
    async fn test_ci_bot_has_no_sweep() {
        let bot = runtime(None, 0);
        let err = bot.sweep().await.unwrap_err();
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_sweep_respects_rate_limit_floor() {
        use crate::collaborators::{IssueTracker, LabelStore, OpenIssue, IssueNote};

        struct Backlog;

        #[async_trait]
        impl IssueTracker for Backlog {
            async fn list_open_issues(&self, _page: u32) -> CollaboratorResult<Vec<OpenIssue>> {
                panic!("listed issues below the rate-limit floor");
            }
            async fn list_comments(&self, _issue: u64) -> CollaboratorResult<Vec<IssueNote>> {
                Ok(Vec::new())
            }
        }

        #[async_trait]
        impl LabelStore for Backlog {
            async fn list_labels(&self) -> CollaboratorResult<Vec<String>> {
                panic!("listed labels below the rate-limit floor");
            }
            async fn add_labels(&self, _issue: u64, _labels: &[String]) -> CollaboratorResult<()> {
                Ok(())
            }
            async fn remove_label(&self, _issue: u64, _label: &str) -> CollaboratorResult<()> {
                Ok(())
            }
            async fn update_labels(&self, _issue: u64, _labels: &[String]) -> CollaboratorResult<()> {
                Ok(())
            }
        }

        let backlog = Arc::new(Backlog);
        let sweep = LabelSweep::new(
            &BotProfile::label_bot(),
            backlog.clone(),
            backlog,
            Arc::new(Quiet::default()),
        );
        let bot = runtime(Some(Probe::new(Ok(10))), 4000).with_sweep(sweep);

        let err = bot.sweep().await.unwrap_err();
        assert_eq!(err.status_code(), 503);
    }

    #[tokio::test]
    async fn test_batch_runs_every_record() {
        let bot = runtime(None, 4000);
        let responses = bot.handle_batch(&[unsigned(), unsigned()]).await;
        assert_eq!(responses.len(), 2);
    }
}
