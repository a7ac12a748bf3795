use serde::Serialize;

use crate::domain::order::OrderError;
use crate::repository::RepositoryError;
use crate::validation::{ValidationFailure, Violation};

// ============================================================================
// Service Errors - the taxonomy that crosses the entry-point boundary
// ============================================================================
//
// Every failure a caller can observe is one of these. The middleware chain
// is the only place that turns them into response envelopes; it reads the
// wire code, HTTP status and sanitized message from here.
//
// ============================================================================

pub const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    VersionConflict,
    InvalidTransition,
    AlreadyExists,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::VersionConflict => "VERSION_CONFLICT",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("{}", .0.summary())]
    Validation(#[from] ValidationFailure),

    #[error("Order {0} not found")]
    NotFound(String),

    #[error("Order {id} was modified concurrently (expected version {expected})")]
    VersionConflict {
        id: String,
        expected: i64,
        actual: Option<i64>,
    },

    #[error(transparent)]
    InvalidTransition(#[from] OrderError),

    #[error("Order {0} already exists")]
    AlreadyExists(String),

    #[error("No route for {method} {path}")]
    NoRoute { method: String, path: String },

    /// Transient store failure that outlived the retry budget; a later
    /// attempt may succeed
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Permanent store rejection, serialization or wiring failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::Validation(_) => ErrorCode::ValidationError,
            ServiceError::NotFound(_) | ServiceError::NoRoute { .. } => ErrorCode::NotFound,
            ServiceError::VersionConflict { .. } => ErrorCode::VersionConflict,
            ServiceError::InvalidTransition(_) => ErrorCode::InvalidTransition,
            ServiceError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            ServiceError::StoreUnavailable(_) | ServiceError::Internal(_) => {
                ErrorCode::InternalError
            }
        }
    }

    pub fn status(&self) -> u16 {
        match self.code() {
            ErrorCode::ValidationError => 400,
            ErrorCode::NotFound => 404,
            ErrorCode::VersionConflict | ErrorCode::AlreadyExists => 409,
            ErrorCode::InvalidTransition => 422,
            ErrorCode::InternalError => 500,
        }
    }

    /// Message safe to show a caller
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::StoreUnavailable(_) | ServiceError::Internal(_) => {
                INTERNAL_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn violations(&self) -> Option<&[Violation]> {
        match self {
            ServiceError::Validation(failure) => Some(&failure.violations),
            _ => None,
        }
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self, ServiceError::VersionConflict { .. })
    }

    /// Whether a later attempt of the same request could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::StoreUnavailable(_) | ServiceError::VersionConflict { .. }
        )
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => ServiceError::NotFound(id),
            RepositoryError::AlreadyExists(id) => ServiceError::AlreadyExists(id),
            RepositoryError::VersionConflict {
                id,
                expected,
                actual,
            } => ServiceError::VersionConflict {
                id,
                expected,
                actual,
            },
            RepositoryError::Unavailable(_) => ServiceError::StoreUnavailable(err.to_string()),
            RepositoryError::Rejected(_) => ServiceError::Internal(err.to_string()),
        }
    }
}
