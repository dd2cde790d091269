//! Error types for the purchase service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{DbErr, SqlErr};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Error type for estate operations
#[derive(Error, Debug)]
pub enum EstateError {
    /// Missing or invalid request fields
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Fewer available chips than requested
    #[error("Insufficient inventory: requested {requested}, available {available}")]
    InsufficientInventory { requested: u32, available: u32 },

    /// No authenticated caller
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated caller lacks permission
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The payment confirmation was already applied to a checkout
    #[error("Payment {0} has already been applied")]
    DuplicatePayment(String),

    /// Chips selected for a purchase were claimed by a concurrent request
    #[error("Chip claim conflict: {0}")]
    ClaimConflict(String),

    #[error("Vote {0} is closed")]
    VoteClosed(String),

    /// A read or write against the backing store failed
    #[error("Database error: {0}")]
    DownstreamFailure(#[from] DbErr),

    /// A multi-step write ended in an unknown state and needs manual reconciliation
    #[error("Partial failure for payment {payment_ref}: {detail}")]
    PartialFailure { payment_ref: String, detail: String },

    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for estate operations
pub type Result<T> = std::result::Result<T, EstateError>;

impl EstateError {
    /// Stable machine-readable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            EstateError::Validation(_) => "validation_error",
            EstateError::InsufficientInventory { .. } => "insufficient_inventory",
            EstateError::Unauthorized(_) => "unauthorized",
            EstateError::Forbidden(_) => "forbidden",
            EstateError::NotFound(_) => "not_found",
            EstateError::DuplicatePayment(_) => "duplicate_payment",
            EstateError::ClaimConflict(_) => "claim_conflict",
            EstateError::VoteClosed(_) => "vote_closed",
            EstateError::DownstreamFailure(_) => "downstream_failure",
            EstateError::PartialFailure { .. } => "partial_failure",
            EstateError::Other(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            EstateError::Validation(_) | EstateError::InsufficientInventory { .. } => {
                StatusCode::BAD_REQUEST
            }
            EstateError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            EstateError::Forbidden(_) => StatusCode::FORBIDDEN,
            EstateError::NotFound(_) => StatusCode::NOT_FOUND,
            EstateError::DuplicatePayment(_)
            | EstateError::ClaimConflict(_)
            | EstateError::VoteClosed(_) => StatusCode::CONFLICT,
            EstateError::DownstreamFailure(_)
            | EstateError::PartialFailure { .. }
            | EstateError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True when the database rejected a write because of a unique key
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            EstateError::DownstreamFailure(e)
                if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        )
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl IntoResponse for EstateError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(code = self.code(), "Request failed: {}", self);
        } else {
            warn!(code = self.code(), "Request rejected: {}", self);
        }

        // Store errors are not echoed back verbatim
        let detail = match &self {
            EstateError::DownstreamFailure(_) | EstateError::Other(_) => None,
            other => Some(other.to_string()),
        };

        let body = ErrorBody {
            error: self.code(),
            detail,
        };

        (status, Json(body)).into_response()
    }
}
