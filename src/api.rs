//! HTTP surface: the WhatsApp webhook pair, the cron sweep trigger, and
//! a health check.

use crate::router::Router as CommandRouter;
use crate::sweep::run_sweep;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{FixedOffset, Utc};
use dhikra_core::config::{ServerConfig, SweepConfig};
use dhikra_core::traits::Messenger;
use dhikra_gateway::{normalize_inbound, verify_challenge};
use dhikra_store::Store;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    router: Arc<CommandRouter>,
    store: Store,
    messenger: Arc<dyn Messenger>,
    sweep: SweepConfig,
    offset: FixedOffset,
    verify_token: String,
    cron_secret: Option<String>,
    uptime: Instant,
}

impl ApiState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        router: Arc<CommandRouter>,
        store: Store,
        messenger: Arc<dyn Messenger>,
        sweep: SweepConfig,
        offset: FixedOffset,
        verify_token: String,
        cron_secret: String,
    ) -> Self {
        let cron_secret = if cron_secret.is_empty() {
            None
        } else {
            Some(cron_secret)
        };
        Self {
            router,
            store,
            messenger,
            sweep,
            offset,
            verify_token,
            cron_secret,
            uptime: Instant::now(),
        }
    }
}

/// Constant-time string comparison to prevent timing attacks on token validation.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Check bearer token auth. Returns `None` if authorized, `Some(response)` if rejected.
fn check_auth(headers: &HeaderMap, secret: &Option<String>) -> Option<(StatusCode, Json<Value>)> {
    let secret = match secret {
        Some(s) => s,
        None => return None, // No auth configured — allow all.
    };

    let header = match headers.get("authorization").and_then(|h| h.to_str().ok()) {
        Some(h) => h,
        None => {
            return Some((
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "missing Authorization header"})),
            ));
        }
    };

    match header.strip_prefix("Bearer ") {
        Some(token) if constant_time_eq(token, secret) => None, // Authorized.
        _ => Some((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid token"})),
        )),
    }
}

/// `GET /webhook` — Cloud API subscription handshake.
async fn webhook_verify(
    State(state): State<ApiState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<String, StatusCode> {
    let challenge = verify_challenge(
        params.get("hub.mode").map(String::as_str),
        params.get("hub.verify_token").map(String::as_str),
        &state.verify_token,
        params.get("hub.challenge").map(String::as_str),
    );

    match challenge {
        Some(c) => {
            info!("webhook subscription verified");
            Ok(c.to_string())
        }
        None => Err(StatusCode::FORBIDDEN),
    }
}

/// `POST /webhook` — inbound message callback.
///
/// Status-only callbacks are acknowledged without routing. Routing errors
/// become an opaque 500; the raw cause stays in the logs.
async fn webhook_receive(
    State(state): State<ApiState>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let Some(msg) = normalize_inbound(&payload) else {
        return Ok(Json(json!({"status": "ignored"})));
    };

    if let Err(e) = state.router.handle_inbound(&msg).await {
        error!("inbound message handling failed: {e}");
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "internal error"})),
        ));
    }

    Ok(Json(json!({"status": "processed"})))
}

/// `GET /cron/sweep` — run one notification sweep.
async fn cron_sweep(
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Some(err) = check_auth(&headers, &state.cron_secret) {
        return Err(err);
    }

    let now = Utc::now();
    let report = run_sweep(&state.store, &state.messenger, &state.sweep, state.offset, now).await;

    Ok(Json(json!({
        "status": "ok",
        "reminders": report.reminders,
        "tasks": report.tasks,
        "meetings": report.meetings,
        "errors": report.errors,
        "timestamp": now.to_rfc3339(),
    })))
}

/// `GET /health` — health check with uptime.
async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.uptime.elapsed().as_secs(),
    }))
}

/// Build the axum router with shared state.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/webhook", get(webhook_verify).post(webhook_receive))
        .route("/cron/sweep", get(cron_sweep))
        .route("/health", get(health))
        .layer(axum::extract::DefaultBodyLimit::max(1024 * 1024)) // 1 MB max request body
        .with_state(state)
}

/// Start the API server.
pub async fn serve(config: &ServerConfig, state: ApiState) -> Result<(), anyhow::Error> {
    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("server listening on {addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
