pub mod broker;
pub mod cli;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod mapper;
pub mod metrics;
pub mod publisher;
pub mod services;
pub mod startup;
pub mod validation;

use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

use crate::health::DependencyChecker;
use crate::services::IngestionService;

#[derive(Clone)]
pub struct AppState {
    pub ingestion: IngestionService,
    pub health_checkers: Arc<Vec<Arc<dyn DependencyChecker>>>,
    pub max_batch_size: usize,
    pub start_time: Instant,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/transactions", handlers::transactions::router())
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
