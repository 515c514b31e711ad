use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid {entity} status transition: {from} -> {to}")]
    InvalidStatusTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// The record moved away from the expected status before the write landed.
    #[error("{entity} status changed concurrently: expected {expected}, found {actual}")]
    StatusConflict {
        entity: &'static str,
        expected: String,
        actual: String,
    },

    #[error("offer no longer available")]
    OfferNoLongerAvailable,

    #[error("offer belongs to another worker")]
    NotOfferRecipient,

    #[error("worker is not eligible for this task")]
    WorkerNotEligible,

    #[error("task already has a pending offer")]
    DuplicatePendingOffer,

    #[error("active allocation already exists for {0}")]
    ActiveAllocationExists(String),

    #[error("task is allocated to another worker")]
    NotAssignedWorker,

    #[error("proof of completion rejected: {0}")]
    ProofRejected(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Contention errors are expected under concurrent writers and are retried or skipped.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            AppError::StatusConflict { .. } | AppError::DuplicatePendingOffer
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidStatusTransition { .. }
            | AppError::StatusConflict { .. }
            | AppError::DuplicatePendingOffer
            | AppError::ActiveAllocationExists(_) => StatusCode::CONFLICT,
            AppError::OfferNoLongerAvailable => StatusCode::GONE,
            AppError::NotOfferRecipient | AppError::NotAssignedWorker => StatusCode::FORBIDDEN,
            AppError::WorkerNotEligible | AppError::ProofRejected(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
