//! # circles-api
//!
//! REST API layer for Circles. Accounts and sessions, the circle hierarchy, and the
//! permission queries that sit on top of it, all as JSON under `/api`.

pub mod auth;
pub mod middleware;
pub mod routes;

use axum::Router;
use circles_common::{config::SessionConfig, permissions::PermissionCatalog};
use circles_db::Database;
use std::sync::Arc;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// Built once at startup; never mutated afterwards.
    pub catalog: Arc<PermissionCatalog>,
    pub sessions: SessionConfig,
}

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let state = Arc::new(state);

    let api_routes = Router::new()
        .merge(routes::auth::router(&state))
        .merge(routes::accounts::router(&state))
        .merge(routes::circles::router(&state))
        .merge(routes::health::router());

    Router::new()
        .nest("/api", api_routes)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::compression::CompressionLayer::new())
        .with_state(state)
}
