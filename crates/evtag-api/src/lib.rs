//! # evtag-api — Axum API Service for the Evidence & Tagging Core
//!
//! ## API Surface
//!
//! | Prefix                                   | Module                    |
//! |------------------------------------------|---------------------------|
//! | `/v1/organizations/:org/evidence/*`      | [`routes::evidence`]      |
//! | `/v1/organizations/:org/owners/*`        | [`routes::evidence`]      |
//! | `/v1/organizations/:org/controls/*`      | [`routes::evidence`]      |
//! | `/v1/organizations/:org/tags/*`          | [`routes::projections`]   |
//! | `/v1/organizations/:org/programs/*`      | [`routes::projections`]   |
//! | `/v1/organizations/:org/tasks/*`         | [`routes::projections`]   |
//! | `/v1/organizations/:org/exports`         | [`routes::exports`]       |
//! | `/v1/exports/*`, `/v1/links/*`           | [`routes::exports`]       |
//!
//! Health probes live at `/health/liveness` and `/health/readiness`.

pub mod db;
pub mod error;
pub mod extractors;
pub mod routes;
pub mod seed;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Uploads arrive base64-encoded in JSON bodies.
const BODY_LIMIT: usize = 32 * 1024 * 1024;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .merge(routes::evidence::router())
        .merge(routes::projections::router())
        .merge(routes::exports::router())
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let health = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .with_state(state);

    Router::new().merge(health).merge(api)
}

/// Liveness probe. Always 200 while the process runs.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 "ready", or 503 when the database is unreachable.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let _ = state.database().snapshot();

    if let Some(pool) = &state.pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!("database health check failed: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
        }
    }

    (StatusCode::OK, "ready").into_response()
}
