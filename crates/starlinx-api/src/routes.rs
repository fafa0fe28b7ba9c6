//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with tracing, compression, the submission
//! rate limiter, the admin gate, and all endpoint handlers.

use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use starlinx_core::config::StarlinxConfig;
use starlinx_core::error::StarlinxError;

use crate::handlers;
use crate::rate_limit::SubmissionLimiter;
use crate::state::AppState;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let limiter = SubmissionLimiter::new(state.config.limits.submissions_per_sec);

    // Public submission route, rate limited.
    let submit_routes = Router::new()
        .route("/register", post(handlers::register))
        .layer(DefaultBodyLimit::max(16 * 1024))
        .layer(axum::middleware::from_fn(
            crate::rate_limit::limit_submissions,
        ))
        .layer(axum::Extension(limiter));

    // Routes that do NOT require the admin key.
    let public_routes = Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/ping", get(handlers::ping))
        .merge(submit_routes);

    let admin_routes = Router::new()
        .route("/admin/stats", get(handlers::admin_stats))
        .route("/admin/schema", post(handlers::admin_schema))
        .route("/admin/registrations", get(handlers::admin_registrations))
        .route("/export.csv", get(handlers::export_csv))
        .route("/export.json", get(handlers::export_json))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::auth::require_admin,
        ));

    public_routes
        .merge(admin_routes)
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server on the configured bind address and port.
pub async fn start_server(config: &StarlinxConfig, state: AppState) -> Result<(), StarlinxError> {
    let addr = format!("{}:{}", config.general.bind, config.general.port);

    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| StarlinxError::Config(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(StarlinxError::Io)?;

    Ok(())
}
