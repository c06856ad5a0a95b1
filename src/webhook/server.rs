//! axum router for platform webhooks.
//!
//! Webhooks are acknowledged as soon as the events are handed to the
//! engine; replies are produced asynchronously by the batch timers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::event::WebhookEvent;
use crate::orchestrator::Engine;
use crate::platform::messenger::{verify_subscription, MessengerWebhook};
use crate::platform::telegram::TelegramUpdate;
use crate::platform::TelegramPlatform;
use crate::{AppError, Result};

/// Shared state for webhook handlers.
pub struct WebhookState {
    /// Orchestration engine receiving events.
    pub engine: Engine,
    /// Messenger subscription verify token.
    pub verify_token: String,
    /// Telegram client used to resolve photo attachments.
    pub telegram: Option<Arc<TelegramPlatform>>,
}

/// Handler for `GET /health`.
async fn health() -> &'static str {
    "ok"
}

/// Messenger subscription handshake parameters.
///
/// Values arrive form-encoded; the `Query` extractor decodes them.
#[derive(Debug, Deserialize)]
struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

async fn messenger_verify(
    State(state): State<Arc<WebhookState>>,
    Query(query): Query<VerifyQuery>,
) -> impl IntoResponse {
    match verify_subscription(
        non_empty(query.mode.as_ref()),
        non_empty(query.verify_token.as_ref()),
        non_empty(query.challenge.as_ref()),
        &state.verify_token,
    ) {
        Some(challenge) => {
            info!("messenger webhook verified");
            (StatusCode::OK, challenge)
        }
        None => {
            warn!("messenger webhook verification rejected");
            (StatusCode::FORBIDDEN, "forbidden".to_owned())
        }
    }
}

/// Decode a webhook body; decoding errors become `AppError::Webhook`.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(body)?)
}

async fn messenger_receive(State(state): State<Arc<WebhookState>>, body: Bytes) -> impl IntoResponse {
    let payload: MessengerWebhook = match parse_body(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(%err, "malformed messenger webhook");
            return (StatusCode::BAD_REQUEST, "invalid payload");
        }
    };
    for event in payload.into_events() {
        dispatch(&state.engine, event);
    }
    (StatusCode::OK, "EVENT_RECEIVED")
}

async fn telegram_receive(State(state): State<Arc<WebhookState>>, body: Bytes) -> impl IntoResponse {
    let update: TelegramUpdate = match parse_body(&body) {
        Ok(update) => update,
        Err(err) => {
            warn!(%err, "malformed telegram update");
            return (StatusCode::BAD_REQUEST, "invalid payload");
        }
    };
    debug!(update_id = update.update_id, "telegram update received");

    // Photos are resolved before acknowledging so updates reach the batch in order.
    let event = match &state.telegram {
        Some(telegram) => telegram.resolve_update(update).await,
        None => update.into_event(Vec::new()),
    };
    if let Some(event) = event {
        dispatch(&state.engine, event);
    }
    (StatusCode::OK, "ok")
}

/// Hand one normalized event to the engine.
///
/// Postbacks are answered on a spawned task so the webhook returns promptly.
pub fn dispatch(engine: &Engine, event: WebhookEvent) {
    match event {
        WebhookEvent::Message(message) => {
            let outcome = engine.handle_message(message);
            debug!(?outcome, "message handled");
        }
        WebhookEvent::Postback(postback) => {
            let engine = engine.clone();
            tokio::spawn(async move {
                if let Err(err) = engine.handle_postback(postback).await {
                    warn!(%err, "postback reply failed");
                }
            });
        }
    }
}

/// Build the webhook router.
pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/webhook/messenger",
            get(messenger_verify).post(messenger_receive),
        )
        .route("/webhook/telegram", axum::routing::post(telegram_receive))
        .with_state(state)
}

/// Serve the webhook router on `port` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the listener fails to bind or the server errors.
pub async fn serve(state: Arc<WebhookState>, port: u16, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind webhook listener on {bind}: {err}")))?;

    info!(%bind, "webhook server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Config(format!("webhook server error: {err}")))?;

    info!("webhook server shut down");
    Ok(())
}
