// SPDX-License-Identifier: Apache-2.0

//! Error types for the Micropub endpoint.
//!
//! Components never convert their own failures into HTTP; they return a
//! [`MicropubError`] and the router turns it into a status code plus the
//! Micropub JSON error body `{"error", "error_description"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Application error taxonomy, one variant per HTTP outcome.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MicropubError {
    /// Missing, malformed or rejected credential (401)
    #[error("{0}")]
    Unauthorized(String),

    /// Valid credential but missing scope (403)
    #[error("{0}")]
    InsufficientScope(String),

    /// Malformed request shape, unsupported content type, unknown action (400)
    #[error("{0}")]
    InvalidRequest(String),

    /// Not-yet-implemented query or operation (501)
    #[error("{0}")]
    NotImplemented(String),

    /// Media exceeds the configured size cap (413)
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Remote store or identity endpoint failure (500)
    #[error("{0}")]
    Upstream(String),
}

/// Micropub wire-format error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub error_description: String,
}

impl MicropubError {
    /// The Micropub error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::InsufficientScope(_) => "insufficient_scope",
            Self::InvalidRequest(_) | Self::PayloadTooLarge(_) => "invalid_request",
            Self::NotImplemented(_) => "not_implemented",
            Self::Upstream(_) => "server_error",
        }
    }

    /// The HTTP status this variant maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientScope(_) => StatusCode::FORBIDDEN,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MicropubError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code(),
            error_description: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias used across components.
pub type Result<T> = std::result::Result<T, MicropubError>;
