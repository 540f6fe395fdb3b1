//! GitHub REST client
//!
//! Implements the label store, issue tracker, comment poster, team
//! directory and rate limit probe on top of the REST v3 API with basic
//! authentication.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::collaborators::{
    CollaboratorResult, CommentPoster, IssueNote, IssueTracker, LabelStore, OpenIssue,
    RateLimitProbe, TeamDirectory,
};
use crate::config::GitHubConfig;
use crate::error::CollaboratorError;
use crate::secrets::Credentials;

const USER_AGENT: &str = "mxnet-bot";
const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Deserialize)]
struct Label {
    name: String,
}

#[derive(Debug, Deserialize)]
struct User {
    login: String,
}

#[derive(Debug, Deserialize)]
struct Issue {
    number: u64,
    user: User,
    #[serde(default)]
    labels: Vec<Label>,
    #[serde(default)]
    comments: u64,
}

#[derive(Debug, Deserialize)]
struct Comment {
    user: User,
    #[serde(default)]
    body: String,
}

#[derive(Debug, Deserialize)]
struct Membership {
    state: String,
}

#[derive(Debug, Deserialize)]
struct RateLimit {
    rate: RateBucket,
}

#[derive(Debug, Deserialize)]
struct RateBucket {
    remaining: u32,
}

/// Client for one repository
#[derive(Clone)]
pub struct GitHubClient {
    http: Client,
    config: GitHubConfig,
    credentials: Credentials,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig, credentials: Credentials) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build GitHub HTTP client")?;

        Ok(Self {
            http,
            config,
            credentials,
        })
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.config.api_base_url, self.config.repository.owner, self.config.repository.name, path
        )
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .basic_auth(&self.credentials.user, Some(&self.credentials.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(&self, request: RequestBuilder) -> CollaboratorResult<Response> {
        let response = self.authed(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(CollaboratorError::from_status(status.as_u16(), body))
    }

    /// GET `url` and every page its `Link` header chains to.
    async fn get_all_pages<T: DeserializeOwned>(&self, url: String) -> CollaboratorResult<Vec<T>> {
        let mut items = Vec::new();
        let mut url = Some(url);

        while let Some(current) = url.take() {
            let response = self.send(self.http.get(&current)).await?;
            url = response
                .headers()
                .get(reqwest::header::LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_page);

            let page: Vec<T> = response.json().await?;
            items.extend(page);
        }

        Ok(items)
    }
}

/// URL of the `rel="next"` entry of a `Link` header.
fn next_page(link: &str) -> Option<String> {
    link.split(',').find_map(|part| {
        let (url, params) = part.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| p.trim().eq_ignore_ascii_case("rel=\"next\""));
        is_next.then(|| {
            url.trim()
                .trim_start_matches('<')
                .trim_end_matches('>')
                .to_string()
        })
    })
}

#[async_trait]
impl LabelStore for GitHubClient {
    async fn list_labels(&self) -> CollaboratorResult<Vec<String>> {
        let url = format!(
            "{}?per_page={}&page=1",
            self.repo_url("/labels"),
            self.config.label_page_size
        );
        let names: Vec<String> = self
            .get_all_pages::<Label>(url)
            .await?
            .into_iter()
            .map(|l| l.name)
            .collect();

        debug!(count = names.len(), "Fetched repository labels");
        Ok(names)
    }

    async fn add_labels(&self, issue: u64, labels: &[String]) -> CollaboratorResult<()> {
        let url = self.repo_url(&format!("/issues/{}/labels", issue));
        self.send(self.http.post(&url).json(&json!({ "labels": labels })))
            .await?;
        info!(issue, labels = ?labels, "Added labels");
        Ok(())
    }

    async fn remove_label(&self, issue: u64, label: &str) -> CollaboratorResult<()> {
        let url = self.repo_url(&format!(
            "/issues/{}/labels/{}",
            issue,
            urlencoding::encode(label)
        ));
        self.send(self.http.delete(&url)).await?;
        info!(issue, label = %label, "Removed label");
        Ok(())
    }

    async fn update_labels(&self, issue: u64, labels: &[String]) -> CollaboratorResult<()> {
        let url = self.repo_url(&format!("/issues/{}/labels", issue));
        self.send(self.http.put(&url).json(&json!({ "labels": labels })))
            .await?;
        info!(issue, labels = ?labels, "Replaced labels");
        Ok(())
    }
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn list_open_issues(&self, page: u32) -> CollaboratorResult<Vec<OpenIssue>> {
        let url = format!(
            "{}?state=open&sort=created&direction=desc&per_page={}&page={}",
            self.repo_url("/issues"),
            self.config.issue_page_size,
            page
        );
        let issues: Vec<Issue> = self.send(self.http.get(&url)).await?.json().await?;
        debug!(page, count = issues.len(), "Fetched open issues");

        Ok(issues
            .into_iter()
            .map(|issue| OpenIssue {
                number: issue.number,
                author: issue.user.login,
                labels: issue.labels.into_iter().map(|l| l.name).collect(),
                comments: issue.comments,
            })
            .collect())
    }

    async fn list_comments(&self, issue: u64) -> CollaboratorResult<Vec<IssueNote>> {
        let url = format!(
            "{}?per_page=100&page=1",
            self.repo_url(&format!("/issues/{}/comments", issue))
        );
        Ok(self
            .get_all_pages::<Comment>(url)
            .await?
            .into_iter()
            .map(|c| IssueNote {
                author: c.user.login,
                body: c.body,
            })
            .collect())
    }
}

#[async_trait]
impl CommentPoster for GitHubClient {
    async fn post_comment(&self, issue: u64, body: &str) -> CollaboratorResult<()> {
        let url = self.repo_url(&format!("/issues/{}/comments", issue));
        self.send(self.http.post(&url).json(&json!({ "body": body })))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TeamDirectory for GitHubClient {
    async fn is_privileged_member(&self, login: &str) -> CollaboratorResult<bool> {
        let Some(team) = &self.config.privileged_team else {
            return Ok(false);
        };
        let url = format!(
            "{}/orgs/{}/teams/{}/memberships/{}",
            self.config.api_base_url,
            self.config.privileged_org,
            team,
            urlencoding::encode(login)
        );

        match self.send(self.http.get(&url)).await {
            Ok(response) => {
                let membership: Membership = response.json().await?;
                Ok(membership.state == "active")
            }
            Err(CollaboratorError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl RateLimitProbe for GitHubClient {
    async fn rate_limit_remaining(&self) -> CollaboratorResult<u32> {
        let url = format!("{}/rate_limit", self.config.api_base_url);
        let limit: RateLimit = self.send(self.http.get(&url)).await?.json().await?;
        Ok(limit.rate.remaining)
    }
}
