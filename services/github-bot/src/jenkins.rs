//! Jenkins client for multibranch pipelines
//!
//! Every supported job is a multibranch pipeline under one folder, with one
//! branch job per pull request: `{folder}/{job}/PR-{number}`.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use tracing::{debug, info};

use crate::collaborators::{CiTrigger, CollaboratorResult};
use crate::config::JenkinsConfig;
use crate::error::CollaboratorError;
use crate::secrets::Credentials;

#[derive(Clone)]
pub struct JenkinsClient {
    http: Client,
    config: JenkinsConfig,
    credentials: Option<Credentials>,
}

impl JenkinsClient {
    pub fn new(config: JenkinsConfig, credentials: Option<Credentials>) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent("mxnet-bot")
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build Jenkins HTTP client")?;

        Ok(Self {
            http,
            config,
            credentials,
        })
    }

    fn job_url(&self, job: &str) -> String {
        format!(
            "{}/job/{}/job/{}",
            self.config.base_url,
            urlencoding::encode(&self.config.job_folder),
            urlencoding::encode(job)
        )
    }

    async fn post(&self, url: &str) -> CollaboratorResult<()> {
        let mut request: RequestBuilder = self.http.post(url);
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.user, Some(&creds.token));
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(CollaboratorError::from_status(status.as_u16(), body))
    }
}

#[async_trait]
impl CiTrigger for JenkinsClient {
    async fn list_supported_jobs(&self) -> CollaboratorResult<Vec<String>> {
        Ok(self.config.supported_jobs.clone())
    }

    async fn trigger_job(&self, job: &str, issue: u64) -> CollaboratorResult<()> {
        let url = format!("{}/job/PR-{}/build", self.job_url(job), issue);
        debug!(url = %url, "Triggering Jenkins build");
        self.post(&url).await?;
        info!(job = %job, issue, "Jenkins build queued");
        Ok(())
    }

    async fn request_rescan(&self, job: &str) -> CollaboratorResult<()> {
        let url = format!("{}/build?delay=0", self.job_url(job));
        self.post(&url).await?;
        info!(job = %job, "Jenkins multibranch scan requested");
        Ok(())
    }
}
