//! Read-only HTTP API over the signal log.

use crate::query::signal_feed;
use crate::store::TIMESTAMP_FORMAT;
use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SubsecRound, Utc};
use log::{error, info};
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub struct ServerState {
    pub log_path: PathBuf,
    /// Rows returned when `/signals` is called without `limit`.
    pub default_limit: usize,
}

#[derive(Debug)]
pub struct ApiError(anyhow::Error);

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Request failed: {:#}", self.0);
        let body = json!({ "status": "error", "message": format!("{:#}", self.0) });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct SignalsQuery {
    pub limit: Option<usize>,
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(heartbeat))
        .route("/signals", get(signals))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /: liveness plus server time.
async fn heartbeat() -> Json<Value> {
    Json(json!({
        "message": "signal API running",
        "time": Utc::now().trunc_subsecs(0).format(TIMESTAMP_FORMAT).to_string(),
    }))
}

/// GET /signals?limit=N: newest logged signals.
async fn signals(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<SignalsQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = query.limit.unwrap_or(state.default_limit);
    let path = state.log_path.clone();
    let feed = tokio::task::spawn_blocking(move || {
        signal_feed(&path, limit, Utc::now().trunc_subsecs(0))
    })
    .await
    .context("signal log reader panicked")??;
    let body = serde_json::to_value(feed).context("failed to encode signal feed")?;
    Ok(Json(body))
}

/// Serves until Ctrl-C.
pub async fn serve(bind: SocketAddr, state: ServerState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    info!(
        "Serving {} on http://{}",
        state.log_path.display(),
        listener.local_addr()?
    );
    axum::serve(listener, router(Arc::new(state)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down API");
        })
        .await
        .context("API server failed")
}
