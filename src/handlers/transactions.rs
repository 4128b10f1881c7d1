use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::domain::TransactionRequest;
use crate::error::AppError;
use crate::validation;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub batch_size: usize,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ThrottleParams {
    pub enabled: bool,
}

/// Routes mounted under `/api/v1/transactions`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(ingest_transaction))
        .route("/batch", post(ingest_batch))
        .route("/health", get(super::health))
        .route("/metrics/basic", get(basic_metrics))
        .route("/throttle", put(set_throttling))
}

pub async fn ingest_transaction(
    State(state): State<AppState>,
    Json(request): Json<TransactionRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!(transaction_id = %request.transaction_id, "Received transaction");
    validation::validate_transaction(&request)?;

    state.ingestion.process_one(&request).await?;

    Ok((StatusCode::ACCEPTED, "Transaction Accepted"))
}

/// Accepts the batch and processes it in the background.
pub async fn ingest_batch(
    State(state): State<AppState>,
    Json(requests): Json<Vec<TransactionRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let batch_size = requests.len();
    info!(batch_size, "Received transaction batch");
    validation::validate_batch(&requests, state.max_batch_size)?;

    let ingestion = state.ingestion.clone();
    tokio::spawn(async move {
        let summary = ingestion.process_batch(requests).await;
        if summary.rejected > 0 {
            error!(
                batch_size = summary.batch_size,
                rejected = summary.rejected,
                "Some transactions in the batch were not submitted"
            );
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(BatchResponse {
            batch_size,
            timestamp: Utc::now(),
            message: "Batch processing started".to_string(),
        }),
    ))
}

pub async fn basic_metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.ingestion.metrics().snapshot())
}

pub async fn set_throttling(
    State(state): State<AppState>,
    Query(params): Query<ThrottleParams>,
) -> impl IntoResponse {
    state.ingestion.metrics().set_throttling_enabled(params.enabled);

    let message = if params.enabled {
        "Throttling enabled"
    } else {
        "Throttling disabled"
    };
    (StatusCode::OK, message)
}
