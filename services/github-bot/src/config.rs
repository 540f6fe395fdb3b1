//! Bot configuration
//!
//! The label bot and the CI bot share one pipeline. What differs between
//! them lives in a [`BotProfile`]; where the bots talk to lives in
//! [`GitHubConfig`] and [`JenkinsConfig`].

use std::fmt;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::ValueEnum;

use crate::command::{ActionKind, CommandParser};

/// Default GitHub REST endpoint
pub const GITHUB_API: &str = "https://api.github.com";

/// Invocations are skipped when fewer GitHub API calls remain.
pub const DEFAULT_RATE_LIMIT_FLOOR: u32 = 4000;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Issues labeled per sweep run at most.
pub const DEFAULT_SWEEP_LIMIT: usize = 50;

/// Which bot a pipeline runs as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum BotKind {
    /// Label management (`@mxnet-label-bot add [bug]`)
    LabelBot,
    /// CI triggering (`@mxnet-ci-bot run ci [centos-cpu]`)
    CiBot,
}

impl fmt::Display for BotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotKind::LabelBot => write!(f, "label-bot"),
            BotKind::CiBot => write!(f, "ci-bot"),
        }
    }
}

/// How requested arguments are checked against the known set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidityPolicy {
    /// Drop unknown arguments and act on the rest
    Lenient,
    /// Reject when nothing matches; `expand_token` selects the whole known set
    Strict { expand_token: String },
}

/// Per-bot parametrization of the command pipeline
#[derive(Debug, Clone)]
pub struct BotProfile {
    pub kind: BotKind,
    /// Literal handle used to address the bot
    pub mention: String,
    /// Account the bot comments as; its own comments are ignored
    pub bot_login: String,
    pub vocabulary: Vec<(String, ActionKind)>,
    pub validity: ValidityPolicy,
    /// Posted when a command cannot be parsed
    pub help_text: String,
    /// Posted when the comment author is not authorized
    pub denial_text: String,
    /// "labels" or "jobs", used in messages
    pub argument_noun: &'static str,
}

impl BotProfile {
    pub fn label_bot() -> Self {
        Self {
            kind: BotKind::LabelBot,
            mention: "@mxnet-label-bot".to_string(),
            bot_login: "mxnet-label-bot".to_string(),
            vocabulary: vec![
                ("add".to_string(), ActionKind::Add),
                ("remove".to_string(), ActionKind::Remove),
                ("update".to_string(), ActionKind::Update),
            ],
            validity: ValidityPolicy::Lenient,
            help_text: "Undefined action detected. \n\
                        Permissible actions are : add, remove, update \n\
                        Example : @mxnet-label-bot add [bug, enhancement] \n\
                        Example : @mxnet-label-bot remove [pending requester info] \n\
                        Example : @mxnet-label-bot update [feature request, operator]"
                .to_string(),
            // "Label Bot Admin" is advertised but not checked.
            denial_text: "Unauthorized access detected. \n\
                          Only following 3 categories can modify labels : \n\
                          Issue Author, MXNet Committer, Label Bot Admin."
                .to_string(),
            argument_noun: "labels",
        }
    }

    pub fn ci_bot() -> Self {
        Self {
            kind: BotKind::CiBot,
            mention: "@mxnet-ci-bot".to_string(),
            bot_login: "mxnet-ci-bot".to_string(),
            vocabulary: vec![
                ("run ci".to_string(), ActionKind::Trigger),
                ("run".to_string(), ActionKind::Trigger),
                ("trigger".to_string(), ActionKind::Trigger),
            ],
            validity: ValidityPolicy::Strict {
                expand_token: "all".to_string(),
            },
            help_text: "Undefined action detected. \n\
                        Permissible actions are : run, trigger \n\
                        Example : @mxnet-ci-bot run [centos-cpu] \n\
                        Example : @mxnet-ci-bot trigger [centos-gpu]"
                .to_string(),
            // "Jenkins Admin" is advertised but not checked.
            denial_text: "Unauthorized access detected. \n\
                          Only following 3 categories can trigger CI : \n\
                          PR Author, MXNet Committer, Jenkins Admin."
                .to_string(),
            argument_noun: "jobs",
        }
    }

    pub fn for_kind(kind: BotKind) -> Self {
        match kind {
            BotKind::LabelBot => Self::label_bot(),
            BotKind::CiBot => Self::ci_bot(),
        }
    }

    /// Override the account whose comments the bot ignores.
    pub fn with_bot_login(mut self, login: impl Into<String>) -> Self {
        self.bot_login = login.into();
        self
    }

    pub fn parser(&self) -> CommandParser {
        CommandParser::new(self.mention.clone(), self.vocabulary.clone())
    }
}

/// GitHub repository in `owner/repo` form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.trim().split('/').collect();
        if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
            bail!("Invalid repository format: {}. Expected: owner/repo", value);
        }
        Ok(Self {
            owner: parts[0].to_string(),
            name: parts[1].to_string(),
        })
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// GitHub API settings
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_base_url: String,
    pub repository: RepoRef,
    /// Organization owning the privileged team
    pub privileged_org: String,
    /// Team slug whose members may run commands on any issue
    pub privileged_team: Option<String>,
    pub request_timeout: Duration,
    pub label_page_size: u32,
    pub issue_page_size: u32,
}

impl GitHubConfig {
    pub fn new(repository: RepoRef) -> Self {
        Self {
            api_base_url: GITHUB_API.to_string(),
            privileged_org: repository.owner.clone(),
            repository,
            privileged_team: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            label_page_size: 100,
            issue_page_size: 100,
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_privileged_team(mut self, org: impl Into<String>, team: impl Into<String>) -> Self {
        self.privileged_org = org.into();
        self.privileged_team = Some(team.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Jenkins settings
#[derive(Debug, Clone)]
pub struct JenkinsConfig {
    pub base_url: String,
    /// Folder holding one multibranch pipeline per job
    pub job_folder: String,
    pub supported_jobs: Vec<String>,
    pub request_timeout: Duration,
}

impl JenkinsConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            job_folder: "mxnet-validation".to_string(),
            supported_jobs: default_jobs(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_jobs(mut self, jobs: Vec<String>) -> Self {
        self.supported_jobs = jobs;
        self
    }

    pub fn with_job_folder(mut self, folder: impl Into<String>) -> Self {
        self.job_folder = folder.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn default_jobs() -> Vec<String> {
    ["clang", "edge", "centos-cpu", "centos-gpu"]
        .iter()
        .map(|job| job.to_string())
        .collect()
}

/// Settings shared by the queue consumer and the HTTP gateway
#[derive(clap::Args, Debug, Clone)]
pub struct RuntimeArgs {
    /// Repository in format owner/repo
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub repo: String,

    /// GitHub API base URL (for GitHub Enterprise)
    #[arg(long, env = "GITHUB_API_URL", default_value = GITHUB_API)]
    pub github_api_url: String,

    /// Organization owning the privileged team
    #[arg(long, env = "PRIVILEGED_ORG", default_value = "apache")]
    pub privileged_org: String,

    /// Team slug whose members are authorized on every issue
    #[arg(long, env = "PRIVILEGED_TEAM", default_value = "mxnet-committers")]
    pub privileged_team: String,

    /// Jenkins base URL
    #[arg(long, env = "JENKINS_URL", default_value = "http://jenkins.mxnet-ci.amazon-ml.com")]
    pub jenkins_url: String,

    /// Jenkins folder containing the per-job multibranch pipelines
    #[arg(long, env = "JENKINS_JOB_FOLDER", default_value = "mxnet-validation")]
    pub jenkins_folder: String,

    /// CI jobs the bot may trigger (comma-separated)
    #[arg(
        long,
        env = "CI_JOBS",
        value_delimiter = ',',
        default_value = "clang,edge,centos-cpu,centos-gpu"
    )]
    pub jobs: Vec<String>,

    /// Account the bots comment as (defaults to the GitHub credential user)
    #[arg(long, env = "BOT_LOGIN")]
    pub bot_login: Option<String>,

    /// Environment variable holding the JSON secret document
    #[arg(long, default_value = "BOT_SECRET_JSON")]
    pub secret_env: String,

    /// GCP project for Secret Manager (enables the GSM secret provider)
    #[arg(long, env = "GCP_PROJECT_ID")]
    pub gcp_project: Option<String>,

    /// Secret name in Secret Manager
    #[arg(long, env = "BOT_SECRET_NAME", default_value = "mxnet-bot-secrets")]
    pub secret_name: String,

    /// Skip invocations when fewer GitHub API calls remain (0 disables)
    #[arg(long, env = "MIN_RATE_LIMIT", default_value_t = DEFAULT_RATE_LIMIT_FLOOR)]
    pub min_rate_limit: u32,

    /// Issues the label sweep labels per run at most
    #[arg(long, env = "SWEEP_LIMIT", default_value_t = DEFAULT_SWEEP_LIMIT)]
    pub sweep_limit: usize,

    /// Timeout for every external HTTP call, in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}

impl RuntimeArgs {
    pub fn github_config(&self) -> Result<GitHubConfig> {
        Ok(GitHubConfig::new(RepoRef::parse(&self.repo)?)
            .with_api_url(self.github_api_url.clone())
            .with_privileged_team(self.privileged_org.clone(), self.privileged_team.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs)))
    }

    pub fn jenkins_config(&self) -> JenkinsConfig {
        let jobs = self
            .jobs
            .iter()
            .map(|job| job.trim().to_lowercase())
            .filter(|job| !job.is_empty())
            .collect();
        JenkinsConfig::new(self.jenkins_url.clone())
            .with_job_folder(self.jenkins_folder.clone())
            .with_jobs(jobs)
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}
