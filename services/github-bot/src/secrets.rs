//! Bot secrets
//!
//! Both bots read one JSON secret document:
//!
//! ```json
//! {
//!   "webhook_secret": "...",
//!   "github_user": "mxnet-ci-bot",
//!   "github_personal_access_token": "...",
//!   "jenkins_user": "...",
//!   "jenkins_api_token": "..."
//! }
//! ```
//!
//! `github_oauth_token` is accepted in place of
//! `github_personal_access_token`. The Jenkins pair is optional.

use std::fmt;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// User name plus API token
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub token: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            token: token.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Everything a bot needs from the secret store
#[derive(Clone, PartialEq, Eq)]
pub struct BotSecrets {
    pub webhook_secret: String,
    pub github: Credentials,
    pub jenkins: Option<Credentials>,
}

impl fmt::Debug for BotSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotSecrets")
            .field("webhook_secret", &"<redacted>")
            .field("github", &self.github)
            .field("jenkins", &self.jenkins)
            .finish()
    }
}

#[derive(Deserialize)]
struct SecretDocument {
    webhook_secret: Option<String>,
    github_user: Option<String>,
    #[serde(alias = "github_oauth_token")]
    github_personal_access_token: Option<String>,
    jenkins_user: Option<String>,
    jenkins_api_token: Option<String>,
}

impl BotSecrets {
    pub fn from_json(document: &str) -> Result<Self> {
        let doc: SecretDocument =
            serde_json::from_str(document).context("Secret document is not valid JSON")?;

        let webhook_secret = non_empty(doc.webhook_secret).context("Secret is missing webhook_secret")?;
        let user = non_empty(doc.github_user).context("Secret is missing github_user")?;
        let token = non_empty(doc.github_personal_access_token)
            .context("Secret is missing github_personal_access_token")?;

        let jenkins = match (non_empty(doc.jenkins_user), non_empty(doc.jenkins_api_token)) {
            (Some(user), Some(token)) => Some(Credentials::new(user, token)),
            (None, None) => None,
            _ => bail!("jenkins_user and jenkins_api_token must be set together"),
        };

        Ok(Self {
            webhook_secret,
            github: Credentials::new(user, token),
            jenkins,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Source of [`BotSecrets`]
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn fetch(&self) -> Result<BotSecrets>;

    async fn webhook_secret(&self) -> Result<String> {
        Ok(self.fetch().await?.webhook_secret)
    }

    async fn credentials(&self) -> Result<Credentials> {
        Ok(self.fetch().await?.github)
    }
}

/// Reads the secret document from an environment variable
pub struct EnvSecretProvider {
    variable: String,
}

impl EnvSecretProvider {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn fetch(&self) -> Result<BotSecrets> {
        debug!(variable = %self.variable, "Reading secrets from environment");
        let document = std::env::var(&self.variable)
            .with_context(|| format!("Environment variable {} is not set", self.variable))?;
        BotSecrets::from_json(&document)
    }
}

#[cfg(feature = "gsm")]
pub use gsm::GsmSecretProvider;

#[cfg(feature = "gsm")]
mod gsm {
    //! Google Secret Manager backend, authenticated with Application
    //! Default Credentials.

    use anyhow::{Context, Result};
    use async_trait::async_trait;
    use gcloud_sdk::google::cloud::secretmanager::v1::secret_manager_service_client::SecretManagerServiceClient;
    use gcloud_sdk::google::cloud::secretmanager::v1::AccessSecretVersionRequest;
    use gcloud_sdk::{GoogleApi, GoogleAuthMiddleware};
    use tracing::{debug, info};

    use super::{BotSecrets, SecretProvider};

    pub struct GsmSecretProvider {
        client: GoogleApi<SecretManagerServiceClient<GoogleAuthMiddleware>>,
        project_id: String,
        secret_name: String,
    }

    impl GsmSecretProvider {
        pub async fn new(project_id: &str, secret_name: &str) -> Result<Self> {
            debug!(project = %project_id, "Initializing GSM client");

            let client = GoogleApi::from_function(
                SecretManagerServiceClient::new,
                "https://secretmanager.googleapis.com",
                None,
            )
            .await
            .context("Failed to initialize GSM client")?;

            Ok(Self {
                client,
                project_id: project_id.to_string(),
                secret_name: secret_name.to_string(),
            })
        }
    }

    #[async_trait]
    impl SecretProvider for GsmSecretProvider {
        async fn fetch(&self) -> Result<BotSecrets> {
            let name = format!(
                "projects/{}/secrets/{}/versions/latest",
                self.project_id, self.secret_name
            );
            debug!(secret = %name, "Fetching secret");

            let response = self
                .client
                .get()
                .access_secret_version(AccessSecretVersionRequest { name })
                .await
                .context("Failed to access secret version")?;

            let payload = response
                .into_inner()
                .payload
                .context("Secret has no payload")?;

            let document = payload.data.as_sensitive_str();
            info!(length = document.len(), "Secret retrieved");
            BotSecrets::from_json(document)
        }
    }
}
