//! Error types for the reference-range service

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use labsync_ranges::{ParameterId, RangeError};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Range(#[from] RangeError),

    /// A write collided with a stored row that differs in content.
    #[error("Reference range conflicts with stored data: {0}")]
    StoredOverlap(String),

    #[error("Parameter not found: {0}")]
    ParameterNotFound(ParameterId),

    #[error("Timed out waiting for the reference-range lock of parameter {parameter_id}")]
    SyncLockTimeout { parameter_id: ParameterId },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Stable machine-readable code reported to callers.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Range(err) => err.code(),
            Error::StoredOverlap(_) => "REFERENCE_RANGE_OVERLAP",
            Error::ParameterNotFound(_) => "PARAMETER_NOT_FOUND",
            Error::SyncLockTimeout { .. } => "SYNC_LOCK_TIMEOUT",
            Error::Validation(_) => "INVALID_REQUEST",
            Error::Database(_) | Error::Migration(_) | Error::Internal(_) | Error::Other(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Range(RangeError::Overlap { .. }) | Error::StoredOverlap(_) => {
                StatusCode::CONFLICT
            }
            Error::Range(_) | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::ParameterNotFound(_) => StatusCode::NOT_FOUND,
            Error::SyncLockTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Database(_) | Error::Migration(_) | Error::Internal(_) | Error::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether resubmitting the unchanged request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::SyncLockTimeout { .. })
    }

    /// Index of the offending descriptor for input errors.
    pub fn descriptor_index(&self) -> Option<usize> {
        match self {
            Error::Range(err) => Some(err.descriptor_index()),
            _ => None,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Internal error: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let mut error = json!({
            "code": self.code(),
            "message": message,
            "retryable": self.is_retryable(),
        });
        if let Some(index) = self.descriptor_index() {
            error["descriptorIndex"] = json!(index);
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();
        if self.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_map_to_client_statuses() {
        let overlap = Error::Range(RangeError::Overlap {
            sex: labsync_ranges::Sex::Ambos,
            first_index: 0,
            first: "[0, 10] years".into(),
            second_index: 1,
            second: "[9, 15] years".into(),
        });
        assert_eq!(overlap.status(), StatusCode::CONFLICT);
        assert_eq!(overlap.code(), "REFERENCE_RANGE_OVERLAP");
        assert_eq!(overlap.descriptor_index(), Some(1));

        let age = Error::Range(RangeError::InvalidAgeRange {
            index: 2,
            age_min: "5".into(),
            age_max: "5".into(),
        });
        assert_eq!(age.status(), StatusCode::BAD_REQUEST);
        assert_eq!(age.code(), "INVALID_AGE_RANGE");
        assert!(!age.is_retryable());
    }

    #[test]
    fn lock_timeout_is_retryable() {
        let err = Error::SyncLockTimeout { parameter_id: 3 };
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.is_retryable());
        let response = err.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }

    #[test]
    fn store_errors_do_not_leak() {
        let err = Error::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
