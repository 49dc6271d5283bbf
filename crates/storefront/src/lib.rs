//! Bytestall Storefront library.
//!
//! Digital-goods storefront: the session-persisted commerce cache, wishlist
//! sync, checkout with manual-proof and redirect e-wallet payments, the order
//! lifecycle, and download gating. The binary in `main.rs` wires it to
//! `PostgreSQL`; the integration tests wire it to in-memory backends.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod orders;
pub mod payments;
pub mod routes;
pub mod services;
pub mod state;

use axum::{Router, extract::State, http::StatusCode, middleware::from_fn, routing::get};
use tower_http::trace::TraceLayer;
use tower_sessions::{SessionManagerLayer, SessionStore};

use state::AppState;

/// Build the full application router.
///
/// Sentry layers are added by the binary, outermost, so tests stay free of a
/// Sentry hub.
pub fn app<S>(state: AppState, session_layer: SessionManagerLayer<S>) -> Router
where
    S: SessionStore + Clone,
{
    let router = router(state.config());
    with_layers(router, state, session_layer)
}

/// Health checks plus every storefront route, without middleware.
pub fn router(config: &config::StorefrontConfig) -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes::routes(config))
}

/// Wrap `router` in the session, request-id and tracing layers.
pub fn with_layers<S>(
    router: Router<AppState>,
    state: AppState,
    session_layer: SessionManagerLayer<S>,
) -> Router
where
    S: SessionStore + Clone,
{
    router
        .layer(session_layer)
        .layer(from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &axum::extract::Request| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
            )
        }))
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies database connectivity before returning OK.
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    let Some(pool) = state.pool() else {
        return StatusCode::OK;
    };
    match sqlx::query("SELECT 1").fetch_one(pool).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
