//! Centralized error types for the Resonance core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses
//!
//! Per the server's error handling design, most protocol-level failures
//! (malformed Slimproto frames, a peer disappearing mid-stream, an operation
//! superseded by a newer generation) are handled at the point of occurrence —
//! logged and the affected state cleaned up — and never reach this enum at
//! all. `ResonanceError` exists for the subset of failures that must surface
//! as an HTTP response or a JSON-RPC `{"error": ...}` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::player::PlayerIdentity;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the Resonance server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum ResonanceError {
    /// A Slimproto or Cometd frame could not be parsed.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No player is registered under the requested identity.
    #[error("Player not found: {0}")]
    PlayerNotFound(PlayerIdentity),

    /// The requested stream slot has no queued file (already drained,
    /// cancelled, or never queued).
    #[error("Stream not found")]
    StreamNotFound,

    /// A transcode was required but no rule/binary could satisfy it.
    #[error("Transcode unavailable: {0}")]
    TranscodeUnavailable(String),

    /// Client sent a malformed or unsupported request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Underlying I/O failure (socket, filesystem, subprocess pipe).
    #[error("I/O error: {0}")]
    Io(String),

    /// Internal invariant violation. Should never be client-caused.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Server configuration error (missing or malformed settings).
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ResonanceError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Protocol(_) => "protocol_error",
            Self::PlayerNotFound(_) => "player_not_found",
            Self::StreamNotFound => "stream_not_found",
            Self::TranscodeUnavailable(_) => "transcode_unavailable",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Io(_) => "io_error",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::PlayerNotFound(_) | Self::StreamNotFound => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) | Self::Protocol(_) => StatusCode::BAD_REQUEST,
            Self::TranscodeUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type ResonanceResult<T> = Result<T, ResonanceError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for ResonanceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for ResonanceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_not_found_returns_correct_code() {
        let err = ResonanceError::StreamNotFound;
        assert_eq!(err.code(), "stream_not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn configuration_error_returns_service_unavailable() {
        let err = ResonanceError::Configuration("missing device table".into());
        assert_eq!(err.code(), "configuration_error");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
