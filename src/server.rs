//! HTTP surface for HipChat: the room message webhook, installation
//! callbacks and a health check.

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;
use crate::hipchat::{HipChatNotifier, InstallPayload, RoomHandle, RoomRegistry, Webhook};
use crate::teamcity::BuildSession;
use crate::watch::{watch_build, WatchOutcome};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub notifier: Arc<HipChatNotifier>,
    pub rooms: Arc<RoomRegistry>,
    /// Poll interval for kicked builds; `None` disables watching
    pub watch_interval: Option<Duration>,
    /// Cancelled on shutdown, stops all running watches
    pub shutdown: CancellationToken,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/hook", post(hook))
        .route("/installable", post(installable))
        .route("/installable/{oauth_id}", delete(uninstall))
        .with_state(state)
}

/// Binds to `port` and serves until Ctrl-C.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    info!("Listening on {}", listener.local_addr()?);

    let shutdown = state.shutdown.clone();
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {e}");
            }
            info!("Shutting down");
            shutdown.cancel();
        })
        .await
        .context("HTTP server failed")
}

async fn healthcheck() -> Json<Value> {
    Json(json!({ "alive": true }))
}

fn error_body(message: impl std::fmt::Display) -> Json<Value> {
    Json(json!({ "status": "error", "error": message.to_string() }))
}

/// Handle a room message: dispatch the command, post the reply and start
/// watching a kicked build.
async fn hook(State(state): State<AppState>, body: Bytes) -> (StatusCode, Json<Value>) {
    let webhook = match Webhook::parse(&body) {
        Ok(webhook) => webhook,
        Err(e) => {
            warn!("Rejected webhook: {e}");
            return (StatusCode::BAD_REQUEST, error_body(e));
        }
    };

    debug!(
        "Webhook {:?} event {} from client {:?}",
        webhook.webhook_id, webhook.event, webhook.oauth_client_id
    );
    match webhook.room_id() {
        Some(room_id) => {
            let name = webhook.room_name().unwrap_or("unnamed");
            match state.rooms.get(&room_id) {
                Some(room) => info!(
                    "Command from room {room_id} '{name}' (installed {}): {}",
                    room.installed_at,
                    webhook.text()
                ),
                None => info!("Command from room {room_id} '{name}': {}", webhook.text()),
            }
        }
        None => info!("Command: {}", webhook.text()),
    }

    let dispatch = state.dispatcher.dispatch(webhook.text()).await;

    if let Err(e) = state.notifier.notify(&dispatch.reply).await {
        error!("Failed to post reply to HipChat: {e}");
        return (StatusCode::BAD_GATEWAY, error_body(e));
    }

    if let (Some(session), Some(interval)) = (dispatch.session, state.watch_interval) {
        spawn_watch(
            session,
            Arc::clone(&state.notifier),
            interval,
            state.shutdown.child_token(),
        );
    }

    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

fn spawn_watch(
    session: BuildSession,
    notifier: Arc<HipChatNotifier>,
    interval: Duration,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        match watch_build(session, &notifier, interval, cancel).await {
            Ok(WatchOutcome::Completed(record)) => {
                info!("Build {} completed with {}", record.id, record.status);
            }
            Ok(WatchOutcome::Cancelled) => {}
            Err(e) => error!("Stopped watching build: {e}"),
        }
    });
}

async fn installable(State(state): State<AppState>, body: Bytes) -> (StatusCode, Json<Value>) {
    let payload = match InstallPayload::parse(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Rejected installation: {e}");
            return (StatusCode::BAD_REQUEST, error_body(e));
        }
    };

    let Some(room_id) = payload.room_id else {
        return (
            StatusCode::BAD_REQUEST,
            error_body("only room installations are supported"),
        );
    };

    debug!(
        "Installation for room {room_id} (group {:?}, capabilities {:?})",
        payload.group_id, payload.capabilities_url
    );
    let inserted = state
        .rooms
        .register(RoomHandle::new(room_id.to_string(), payload.oauth_id));
    info!("{} room(s) installed", state.rooms.len());
    let status = if inserted {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, Json(json!(["OK"])))
}

async fn uninstall(State(state): State<AppState>, Path(oauth_id): Path<String>) -> StatusCode {
    match state.rooms.remove_by_oauth_id(&oauth_id) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}
