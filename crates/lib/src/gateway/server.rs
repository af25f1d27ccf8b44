//! Gateway HTTP server (webhook + probes, single port).

use crate::assistant::OpenAiClient;
use crate::channels::{InboundMessage, MessagingResponse, WebhookForm};
use crate::config::{self, Config};
use crate::relay::{PollPolicy, Relay, RelayError};
use crate::session::InMemorySessionRegistry;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Service name reported by `GET /`.
pub const SERVICE_NAME: &str = "WhatsApp OpenAI Assistant";

const XML_CONTENT_TYPE: &str = "application/xml";

/// Shared state for request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub relay: Arc<Relay>,
    /// Cancelled on shutdown; every in-flight run wait holds a child token.
    pub shutdown: CancellationToken,
}

impl GatewayState {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self {
            relay,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Routes: webhook on `POST /webhook` and `POST /`, probes on `GET /`, `/health`, `/ping`.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(index).post(webhook))
        .route("/webhook", post(webhook))
        .route("/health", get(health))
        .route("/ping", get(ping))
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Requires an OpenAI api key and assistant id. Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let api_key = config::resolve_openai_api_key(&config)
        .context("OpenAI api key not configured (set OPENAI_API_KEY or assistant.apiKey)")?;
    let assistant_id = config::resolve_assistant_id(&config).context(
        "assistant id not configured (set OPENAI_ASSISTANT_ID or assistant.assistantId)",
    )?;

    let provider = Arc::new(OpenAiClient::new(
        api_key,
        Some(config::resolve_openai_base_url(&config)),
    ));
    let sessions = Arc::new(InMemorySessionRegistry::new(provider.clone()));
    let policy = PollPolicy::from(&config.assistant);
    match policy.max_wait {
        Some(d) => log::info!(
            "polling runs every {:?}, giving up after {:?}",
            policy.interval,
            d
        ),
        None => log::info!("polling runs every {:?} with no wait bound", policy.interval),
    }
    let relay = Arc::new(Relay::new(provider, sessions, assistant_id, policy));
    let state = GatewayState::new(relay);
    let shutdown = state.shutdown.clone();
    let app = build_router(state);

    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Cancels pending run waits so in-flight webhooks answer before connections drain.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, cancelling pending runs and draining connections");
    shutdown.cancel();
}

fn xml_response(status: StatusCode, twiml: &MessagingResponse) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, XML_CONTENT_TYPE)],
        twiml.to_xml(),
    )
        .into_response()
}

impl IntoResponse for RelayError {
    /// Empty TwiML with 500: Twilio delivers nothing to the sender.
    fn into_response(self) -> Response {
        log::error!("webhook failed: {}", self);
        xml_response(StatusCode::INTERNAL_SERVER_ERROR, &MessagingResponse::new())
    }
}

/// POST /webhook: one relay turn; the reply text goes back as a TwiML message.
async fn webhook(
    State(state): State<GatewayState>,
    Form(form): Form<WebhookForm>,
) -> Result<Response, RelayError> {
    let msg = InboundMessage::from(form);
    log::info!("inbound message from {}: {}", msg.sender, msg.text);
    let cancel = state.shutdown.child_token();
    let reply = state
        .relay
        .handle_message(&msg.sender, &msg.text, &cancel)
        .await?;
    let mut twiml = MessagingResponse::new();
    twiml.message(reply);
    Ok(xml_response(StatusCode::OK, &twiml))
}

/// GET /: service status.
async fn index() -> Json<serde_json::Value> {
    Json(json!({ "status": "online", "service": SERVICE_NAME }))
}

/// GET /health: status with the current unix time in fractional seconds.
async fn health() -> Json<serde_json::Value> {
    let timestamp = chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0;
    Json(json!({ "status": "ok", "timestamp": timestamp }))
}

/// GET /ping: keep-alive.
async fn ping() -> &'static str {
    "pong"
}
