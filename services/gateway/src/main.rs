//! MXNet Bot Gateway
//!
//! Receives GitHub webhooks over HTTP and runs the matching bot:
//!
//! - `POST /webhook/label-bot`
//! - `POST /webhook/ci-bot`
//! - `GET /health`
//!
//! Each delivery is answered with the bot's `InvocationResponse` and the
//! same HTTP status.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use mxnet_bot::logging::init_tracing;
use mxnet_bot::{load_secrets, BotKind, BotRuntime, InvocationResponse, RuntimeArgs, WebhookEnvelope};

/// MXNet bot webhook gateway
#[derive(Parser, Debug)]
#[command(name = "gateway")]
#[command(about = "Serve GitHub webhooks for the MXNet bots")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Bots to enable (comma-separated)
    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_values_t = vec![BotKind::LabelBot, BotKind::CiBot]
    )]
    bots: Vec<BotKind>,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(flatten)]
    runtime: RuntimeArgs,
}

#[derive(Clone)]
struct AppState {
    bots: Arc<HashMap<BotKind, Arc<BotRuntime>>>,
}

impl AppState {
    fn new(bots: impl IntoIterator<Item = BotRuntime>) -> Self {
        let bots = bots
            .into_iter()
            .map(|bot| (bot.kind(), Arc::new(bot)))
            .collect();
        Self {
            bots: Arc::new(bots),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing("info,tower_http=info", args.log_json);

    info!("Starting MXNet bot gateway");

    let secrets = load_secrets(&args.runtime)
        .await
        .context("Failed to load bot secrets")?;

    let mut bots = Vec::new();
    for kind in &args.bots {
        bots.push(BotRuntime::build(*kind, &args.runtime, &secrets)?);
    }
    let app = app(AppState::new(bots));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/webhook/label-bot", post(label_bot_webhook))
        .route("/webhook/ci-bot", post(ci_bot_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut bots: Vec<String> = state.bots.keys().map(|kind| kind.to_string()).collect();
    bots.sort();
    Json(serde_json::json!({
        "status": "healthy",
        "service": "mxnet-bot-gateway",
        "bots": bots,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn label_bot_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    dispatch(&state, BotKind::LabelBot, &headers, body).await
}

async fn ci_bot_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    dispatch(&state, BotKind::CiBot, &headers, body).await
}

async fn dispatch(state: &AppState, kind: BotKind, headers: &HeaderMap, body: Bytes) -> Response {
    let Some(bot) = state.bots.get(&kind) else {
        warn!(bot = %kind, "Webhook for a disabled bot");
        return respond(InvocationResponse::new(404, format!("{} is not enabled", kind)));
    };

    let body = match String::from_utf8(body.to_vec()) {
        Ok(body) => body,
        Err(_) => return respond(InvocationResponse::new(400, "Webhook body is not UTF-8")),
    };

    let envelope = WebhookEnvelope::new(header_map(headers), body);
    respond(bot.handle(&envelope).await)
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn respond(response: InvocationResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use mxnet_bot::collaborators::{CiTrigger, CollaboratorResult, CommentPoster, TeamDirectory};
    use mxnet_bot::executor::Backend;
    use mxnet_bot::reporter::ResponseReporter;
    use mxnet_bot::signature::sign;
    use mxnet_bot::{BotProfile, CommandPipeline};
    use std::sync::Mutex;
    use tower::ServiceExt;

    const SECRET: &str = "gateway-secret";

    #[derive(Default)]
    struct Recorder {
        triggered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CiTrigger for Recorder {
        async fn list_supported_jobs(&self) -> CollaboratorResult<Vec<String>> {
            Ok(vec!["clang".into(), "edge".into()])
        }
        async fn trigger_job(&self, job: &str, issue: u64) -> CollaboratorResult<()> {
            self.triggered.lock().unwrap().push(format!("{}#{}", job, issue));
            Ok(())
        }
        async fn request_rescan(&self, _job: &str) -> CollaboratorResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl CommentPoster for Recorder {
        async fn post_comment(&self, _issue: u64, _body: &str) -> CollaboratorResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl TeamDirectory for Recorder {
        async fn is_privileged_member(&self, _login: &str) -> CollaboratorResult<bool> {
            Ok(false)
        }
    }

    fn ci_app(recorder: Arc<Recorder>) -> Router {
        let pipeline = CommandPipeline::new(
            BotProfile::ci_bot(),
            SECRET,
            Backend::Ci(recorder.clone()),
            recorder.clone(),
            ResponseReporter::new(recorder),
        );
        app(AppState::new([BotRuntime::from_parts(pipeline, None, 0)]))
    }

    fn comment(text: &str) -> String {
        serde_json::json!({
            "action": "created",
            "issue": { "number": 17, "user": { "login": "author" } },
            "comment": { "body": text, "user": { "login": "author" } }
        })
        .to_string()
    }

    fn webhook(path: &str, body: String, signature: Option<String>) -> Request<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .header("x-github-event", "issue_comment");
        if let Some(signature) = signature {
            request = request.header("x-hub-signature", signature);
        }
        request.body(Body::from(body)).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = ci_app(Arc::new(Recorder::default()));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["bots"], serde_json::json!(["ci-bot"]));
    }

    #[tokio::test]
    async fn test_signed_webhook_triggers_ci() {
        let recorder = Arc::new(Recorder::default());
        let app = ci_app(recorder.clone());

        let body = comment("@mxnet-ci-bot run [clang]");
        let signature = sign(body.as_bytes(), SECRET).unwrap();
        let response = app
            .oneshot(webhook("/webhook/ci-bot", body, Some(signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*recorder.triggered.lock().unwrap(), vec!["clang#17"]);
        let body = json_body(response).await;
        assert_eq!(body["status"], 200);
    }

    #[tokio::test]
    async fn test_unsigned_webhook_is_unauthorized() {
        let recorder = Arc::new(Recorder::default());
        let app = ci_app(recorder.clone());

        let response = app
            .oneshot(webhook("/webhook/ci-bot", comment("@mxnet-ci-bot run [clang]"), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(recorder.triggered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_bot_is_not_found() {
        let app = ci_app(Arc::new(Recorder::default()));
        let body = comment("@mxnet-label-bot add [bug]");
        let signature = sign(body.as_bytes(), SECRET).unwrap();

        let response = app
            .oneshot(webhook("/webhook/label-bot", body, Some(signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_header_map_keeps_text_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-github-event", "issue_comment".parse().unwrap());
        let map = header_map(&headers);
        assert_eq!(map.get("x-github-event").map(String::as_str), Some("issue_comment"));
    }
}
