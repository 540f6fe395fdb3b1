//! MXNet GitHub Bots
//!
//! Webhook command interpreter behind the MXNet label bot and CI bot.
//! Contributors address a bot from an issue or pull request comment:
//!
//! ```text
//! @mxnet-label-bot add [bug, enhancement]
//! @mxnet-label-bot remove [pending requester info]
//! @mxnet-ci-bot run ci [centos-cpu, clang]
//! @mxnet-ci-bot run ci [all]
//! ```
//!
//! Both bots run the same [`pipeline::CommandPipeline`], parametrized by a
//! [`config::BotProfile`].
//!
//! ## Binaries
//!
//! - `process-event`: consume a queued webhook batch from a file or stdin,
//!   or with `--sweep` label the backlog of unlabeled issues
//! - `gateway` (in `mxnet-bot-gateway`): receive webhooks over HTTP
//!
//! ## Example
//!
//! ```bash
//! GITHUB_REPOSITORY=apache/incubator-mxnet \
//! BOT_SECRET_JSON='{"webhook_secret":"...","github_user":"mxnet-ci-bot","github_personal_access_token":"..."}' \
//! process-event --bot ci-bot --input event.json
//! ```

pub mod authorization;
pub mod collaborators;
pub mod command;
pub mod config;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod github;
pub mod jenkins;
pub mod logging;
pub mod pipeline;
pub mod reporter;
pub mod runtime;
pub mod secrets;
pub mod signature;
pub mod sweep;
pub mod validity;

pub use config::{BotKind, BotProfile, RuntimeArgs};
pub use envelope::{parse_queued_message, WebhookEnvelope};
pub use error::{BotError, CollaboratorError};
pub use pipeline::{CommandPipeline, InvocationResponse, PipelineOutcome};
pub use runtime::{load_secrets, BotRuntime};
