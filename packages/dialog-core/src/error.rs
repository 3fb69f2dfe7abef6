//! Centralized error types for the dialog proxy core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the dialog proxy.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum DialogError {
    /// Upstream model is not configured (missing API key, model name, etc.).
    #[error("Upstream not configured: {0}")]
    UpstreamNotConfigured(String),

    /// Upstream connection closed with a retryable reason (will reconnect).
    #[error("Upstream closed (retryable): {0}")]
    UpstreamClosedRetryable(String),

    /// Upstream connection closed with a terminal reason (session ends).
    #[error("Upstream closed (terminal): {0}")]
    UpstreamClosedTerminal(String),

    /// Outbound audio is currently rate limited.
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Failed to decode an inbound payload (malformed JSON, bad base64, etc.).
    #[error("Decode failure: {0}")]
    DecodeFailure(String),

    /// Failed to extract transcript or audio from an upstream payload.
    #[error("Extraction failure: {0}")]
    ExtractionFailure(String),

    /// A sentence was ready for pairing but no audio segment was available.
    #[error("Pairing underrun for turn {turn_id}")]
    PairingUnderrun { turn_id: u64 },

    /// Computed segment duration did not match the expected frame length.
    #[error("Length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// A turn finalized with no text and no segments; the commit was suppressed.
    #[error("Empty turn commit suppressed for turn {turn_id}")]
    EmptyTurnCommitSuppressed { turn_id: u64 },

    /// The connection closed while segments were still pending pairing.
    #[error("{count} segment(s) pending at close")]
    PendingAtClose { count: usize },

    /// Inbound binary data claimed to be UTF-8 text but was not valid.
    #[error("UTF-8 violation: {0}")]
    Utf8Violation(String),

    /// Failed to send a frame to the client or upstream socket.
    #[error("Send failure: {0}")]
    SendFailure(String),

    /// Invalid request from the client.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Server configuration error (missing required settings).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error that does not fit another category.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DialogError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UpstreamNotConfigured(_) => "upstream_not_configured",
            Self::UpstreamClosedRetryable(_) => "upstream_closed_retryable",
            Self::UpstreamClosedTerminal(_) => "upstream_closed_terminal",
            Self::RateLimited { .. } => "rate_limited",
            Self::DecodeFailure(_) => "decode_failure",
            Self::ExtractionFailure(_) => "extraction_failure",
            Self::PairingUnderrun { .. } => "pairing_underrun",
            Self::LengthMismatch { .. } => "length_mismatch",
            Self::EmptyTurnCommitSuppressed { .. } => "empty_turn_commit_suppressed",
            Self::PendingAtClose { .. } => "pending_at_close",
            Self::Utf8Violation(_) => "utf8_violation",
            Self::SendFailure(_) => "send_failure",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::DecodeFailure(_) | Self::Utf8Violation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Configuration(_) | Self::UpstreamNotConfigured(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::UpstreamClosedTerminal(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns whether this error indicates a retryable condition on the upstream link.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::UpstreamClosedRetryable(_) | Self::RateLimited { .. }
        )
    }
}

/// Convenient Result alias for application-wide operations.
pub type DialogResult<T> = Result<T, DialogError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for DialogError {
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
