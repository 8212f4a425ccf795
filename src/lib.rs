//! Platform API - a key-authenticated, throttled REST dispatcher.
//!
//! Every request under `/api` names an installed application and one of its
//! resource controllers (`/api/blog/entries/4`). The dispatcher checks the
//! caller IP against the ban list and bad-key throttle, authenticates the API
//! key, routes to the controller and renders the result as JSON, either a
//! single resource, a paginated envelope or an error envelope.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx, behind storage traits with an
//!   in-memory alternative
//! - **Authentication**: API keys stored as SHA-256 hashes, with IP and
//!   application restrictions
//! - **Format**: JSON responses, JSON or form-urlencoded request bodies

pub mod config;
pub mod controllers;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod pagination;
pub mod request;
pub mod response;
pub mod routing;
pub mod services;
pub mod state;
pub mod store;

use axum::{
    Router,
    routing::{any, get},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use state::{AppState, Backends};

/// Build the HTTP router.
///
/// `/health` is public. `/api`, `/api/` and `/api/{*path}` all reach the
/// dispatcher, which reads the API path from the URL or the query string
/// depending on `FRIENDLY_URLS`.
pub fn create_router(state: AppState) -> Router {
    let cors = if state.config.cors_permissive {
        tracing::warn!("CORS: allowing all origins");
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api", any(handlers::dispatch::dispatch))
        .route("/api/", any(handlers::dispatch::dispatch))
        .route("/api/{*path}", any(handlers::dispatch::dispatch))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
