//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps [`EvtagError`] and [`LinkError`] to HTTP status codes with a JSON
//! body `{ "error": { "code", "message" } }`. Messages of 5xx errors are
//! logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use evtag_core::EvtagError;
use evtag_export::LinkError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. "NOT_FOUND", "ILLEGAL_ATTACH").
    pub code: String,
    pub message: String,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Unknown organization, owner, evidence, tag, export or link (404).
    #[error("{message}")]
    NotFound { code: &'static str, message: String },

    /// Input the core refused to act on (422).
    #[error("{message}")]
    Unprocessable { code: &'static str, message: String },

    /// The request collides with current state (409).
    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    /// The link is past its expiry or disabled (410).
    #[error("{message}")]
    Gone { code: &'static str, message: String },

    /// The caller's deadline passed before the operation committed (504).
    #[error("{0}")]
    Timeout(String),

    /// A dependency is down (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error (500). Message is logged but not returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Unprocessable {
            code: "BAD_REQUEST",
            message: message.into(),
        }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound { code, .. } => (StatusCode::NOT_FOUND, *code),
            Self::Unprocessable { code, .. } => (StatusCode::UNPROCESSABLE_ENTITY, *code),
            Self::Conflict { code, .. } => (StatusCode::CONFLICT, *code),
            Self::Gone { code, .. } => (StatusCode::GONE, *code),
            Self::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "DEADLINE_EXCEEDED"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::ServiceUnavailable(_) => "A required service is unavailable".to_string(),
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::ServiceUnavailable(_) => tracing::warn!(error = %self, "service unavailable"),
            Self::Timeout(_) => tracing::warn!(error = %self, "deadline exceeded"),
            _ => {}
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<EvtagError> for AppError {
    fn from(err: EvtagError) -> Self {
        let code = err.code();
        let message = err.to_string();
        match err {
            EvtagError::NotFound { .. } => Self::NotFound { code, message },
            EvtagError::IllegalAttach { .. } | EvtagError::Validation(_) => {
                Self::Unprocessable { code, message }
            }
            EvtagError::NameExists { .. }
            | EvtagError::NameExhausted { .. }
            | EvtagError::Conflict { .. } => Self::Conflict { code, message },
            EvtagError::DeadlineExceeded { .. } => Self::Timeout(message),
            EvtagError::CacheBackendUnavailable(_) => Self::ServiceUnavailable(message),
            EvtagError::Propagator { .. }
            | EvtagError::ExportPackaging(_)
            | EvtagError::Storage(_) => Self::Internal(message),
        }
    }
}

impl From<LinkError> for AppError {
    fn from(err: LinkError) -> Self {
        let message = err.to_string();
        match err {
            LinkError::NotFound(_) => Self::NotFound {
                code: "NOT_FOUND",
                message,
            },
            LinkError::Expired { .. } => Self::Gone {
                code: "LINK_EXPIRED",
                message,
            },
            LinkError::Disabled(_) => Self::Gone {
                code: "LINK_DISABLED",
                message,
            },
        }
    }
}
