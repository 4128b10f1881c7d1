use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::publisher::PublishError;
use crate::services::{ProcessingCause, ProcessingError};
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Error processing transaction: {0}")]
    Processing(String),

    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<ProcessingError> for AppError {
    fn from(err: ProcessingError) -> Self {
        match &err.cause {
            ProcessingCause::Publish(PublishError::Send { .. })
            | ProcessingCause::Publish(PublishError::Timeout { .. }) => {
                AppError::BrokerUnavailable(err.to_string())
            }
            _ => AppError::Processing(err.to_string()),
        }
    }
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Processing(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BrokerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
