//! Error types for the relay.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::translate::client_types::ErrorResponse;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RelayError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Upstream unreachable: {message}")]
    UpstreamUnreachable { message: String },

    #[error("Upstream timed out: {message}")]
    UpstreamTimeout { message: String },

    #[error("Upstream returned status {status}: {message}")]
    UpstreamError { status: u16, message: String },

    #[error("Malformed upstream body: {message}")]
    MalformedUpstreamBody { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl RelayError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: msg.into(),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedUpstreamBody {
            message: msg.into(),
        }
    }

    pub fn upstream(status: u16, msg: impl Into<String>) -> Self {
        Self::UpstreamError {
            status,
            message: msg.into(),
        }
    }

    /// Classify a transport failure from `reqwest`.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::UpstreamTimeout {
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::upstream(status.as_u16(), err.to_string())
        } else if err.is_decode() {
            Self::malformed(err.to_string())
        } else {
            Self::UpstreamUnreachable {
                message: err.to_string(),
            }
        }
    }

    /// HTTP status reported to the client. Upstream statuses are propagated,
    /// failures without one fall back to 500.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest { .. } => 400,
            Self::UpstreamError { status, .. } => *status,
            Self::MalformedUpstreamBody { .. } => 502,
            _ => 500,
        }
    }

    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request_error",
            Self::UpstreamError { .. } | Self::MalformedUpstreamBody { .. } => "upstream_error",
            Self::UpstreamUnreachable { .. } => "upstream_unreachable",
            Self::UpstreamTimeout { .. } => "upstream_timeout",
            _ => "api_error",
        }
    }

    /// Client-facing error body, also used for in-stream error frames.
    #[must_use]
    pub fn to_body(&self) -> ErrorResponse {
        ErrorResponse::new(self.error_type(), self.to_string(), self.status_code())
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_body())).into_response()
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
