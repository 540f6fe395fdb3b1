//! Command executor
//!
//! Runs a validated command against the label store or the CI system and
//! reports one [`ExecutionOutcome`] per argument. Per-item failures,
//! server errors included, are recorded and the batch continues. Only an
//! unreachable backend stops the batch with a [`SystemicFailure`] carrying
//! whatever already completed.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::collaborators::{CiTrigger, LabelStore};
use crate::command::{ActionKind, Command};
use crate::error::CollaboratorError;
use crate::validity::KnownSet;

/// Result for one label or job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    pub argument: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ExecutionOutcome {
    pub fn success(argument: impl Into<String>) -> Self {
        Self {
            argument: argument.into(),
            succeeded: true,
            detail: None,
        }
    }

    pub fn failure(argument: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            argument: argument.into(),
            succeeded: false,
            detail: Some(detail.into()),
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// The backend went away part way through a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemicFailure {
    pub completed: Vec<ExecutionOutcome>,
    pub reason: String,
}

/// Where commands are executed
#[derive(Clone)]
pub enum Backend {
    Labels(Arc<dyn LabelStore>),
    Ci(Arc<dyn CiTrigger>),
}

impl Backend {
    /// Fetch the current known set from the system of record.
    pub async fn known_set(&self) -> Result<KnownSet, CollaboratorError> {
        let names = match self {
            Backend::Labels(store) => store.list_labels().await?,
            Backend::Ci(ci) => ci.list_supported_jobs().await?,
        };
        Ok(KnownSet::new(names))
    }

    pub async fn execute(&self, command: &Command) -> Result<Vec<ExecutionOutcome>, SystemicFailure> {
        let issue = command.target_issue;
        let args = &command.arguments;

        match (self, command.action) {
            (Backend::Labels(store), ActionKind::Add) => {
                batch_outcome(args, store.add_labels(issue, args).await)
            }
            (Backend::Labels(store), ActionKind::Update) => {
                batch_outcome(args, store.update_labels(issue, args).await)
            }
            (Backend::Labels(store), ActionKind::Remove) => remove_labels(store.as_ref(), issue, args).await,
            (Backend::Ci(ci), ActionKind::Trigger) => trigger_jobs(ci.as_ref(), issue, args).await,
            (_, action) => {
                warn!(action = %action, "Action is not supported by this backend");
                Ok(args
                    .iter()
                    .map(|arg| ExecutionOutcome::failure(arg, format!("'{}' is not supported here", action)))
                    .collect())
            }
        }
    }
}

/// One call covers every label: they succeed or fail together.
fn batch_outcome(
    labels: &[String],
    result: Result<(), CollaboratorError>,
) -> Result<Vec<ExecutionOutcome>, SystemicFailure> {
    match result {
        Ok(()) => Ok(labels.iter().map(ExecutionOutcome::success).collect()),
        Err(e) if e.is_systemic() => {
            error!(error = %e, "Label store unavailable");
            Err(SystemicFailure {
                completed: Vec::new(),
                reason: e.to_string(),
            })
        }
        Err(e) => {
            warn!(error = %e, "Label request rejected");
            Ok(labels
                .iter()
                .map(|label| ExecutionOutcome::failure(label, e.to_string()))
                .collect())
        }
    }
}

async fn remove_labels(
    store: &dyn LabelStore,
    issue: u64,
    labels: &[String],
) -> Result<Vec<ExecutionOutcome>, SystemicFailure> {
    let mut outcomes = Vec::with_capacity(labels.len());

    for label in labels {
        match store.remove_label(issue, label).await {
            Ok(()) => outcomes.push(ExecutionOutcome::success(label)),
            Err(CollaboratorError::NotFound(_)) => {
                outcomes.push(ExecutionOutcome::failure(label, "label is not on the issue"))
            }
            Err(e) if e.is_systemic() => {
                error!(issue, label = %label, error = %e, "Label store unavailable");
                return Err(SystemicFailure {
                    completed: outcomes,
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                warn!(issue, label = %label, error = %e, "Failed to remove label");
                outcomes.push(ExecutionOutcome::failure(label, e.to_string()));
            }
        }
    }

    Ok(outcomes)
}

async fn trigger_jobs(
    ci: &dyn CiTrigger,
    issue: u64,
    jobs: &[String],
) -> Result<Vec<ExecutionOutcome>, SystemicFailure> {
    let mut outcomes = Vec::with_capacity(jobs.len());

    for job in jobs {
        let outcome = match ci.trigger_job(job, issue).await {
            Ok(()) => {
                info!(issue, job = %job, "CI job triggered");
                ExecutionOutcome::success(job)
            }
            Err(CollaboratorError::NotFound(_)) => {
                // Branch not indexed yet; the scan builds it once discovered.
                info!(issue, job = %job, "PR branch not discovered, requesting rescan");
                match ci.request_rescan(job).await {
                    Ok(()) => ExecutionOutcome::success(job).with_detail("rescan requested"),
                    Err(e) if e.is_systemic() => {
                        error!(job = %job, error = %e, "CI system unavailable");
                        return Err(SystemicFailure {
                            completed: outcomes,
                            reason: e.to_string(),
                        });
                    }
                    Err(e) => ExecutionOutcome::failure(job, format!("rescan failed: {}", e)),
                }
            }
            Err(e) if e.is_systemic() => {
                error!(issue, job = %job, error = %e, "CI system unavailable");
                return Err(SystemicFailure {
                    completed: outcomes,
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                warn!(issue, job = %job, error = %e, "Failed to trigger CI job");
                ExecutionOutcome::failure(job, e.to_string())
            }
        };
        outcomes.push(outcome);
    }

    Ok(outcomes)
}
