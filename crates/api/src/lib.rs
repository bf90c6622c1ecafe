//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - REST API routes
//! - Authentication middleware
//! - Error responses and request extractors

pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sea_orm::DatabaseConnection;
use tally_core::ledger::{MutationQuery, RetryPolicy, TransferEngine};
use tally_db::SeaLedgerStore;
use tally_shared::JwtService;
use tally_shared::config::LedgerConfig;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: Arc<DatabaseConnection>,
    /// JWT service for token verification.
    pub jwt_service: Arc<JwtService>,
    /// Transfer engine over the durable store.
    pub engine: Arc<TransferEngine<SeaLedgerStore>>,
    /// History queries over the durable store.
    pub mutations: Arc<MutationQuery<SeaLedgerStore>>,
    /// Deadline applied to each transfer and history request.
    pub request_timeout: Duration,
}

impl AppState {
    /// Wires the ledger components around a database connection.
    #[must_use]
    pub fn new(db: DatabaseConnection, jwt_service: JwtService, ledger: &LedgerConfig) -> Self {
        let store = Arc::new(
            SeaLedgerStore::new(db.clone())
                .with_lock_timeout(Duration::from_millis(ledger.lock_timeout_ms)),
        );

        Self {
            db: Arc::new(db),
            jwt_service: Arc::new(jwt_service),
            engine: Arc::new(TransferEngine::with_policy(
                Arc::clone(&store),
                RetryPolicy::from(ledger),
            )),
            mutations: Arc::new(MutationQuery::new(store)),
            request_timeout: Duration::from_millis(ledger.request_timeout_ms),
        }
    }
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes_with_state(state.clone()))
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}
