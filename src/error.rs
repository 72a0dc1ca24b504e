//! Failure taxonomy for client operations.
//!
//! Every HTTP-level failure carries the status and the parsed response
//! payload so callers can render `{status, message, data}` without knowing
//! which variant they hold.

use serde::Serialize;
use serde_json::Value;

const DEFAULT_FAILURE_MESSAGE: &str = "request failed";

/// Errors produced by the request client and the session built on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// The transport failed before a response arrived.
    #[error("network request failed: {0}")]
    Network(String),

    /// A 401 that survived (or bypassed) the refresh attempt.
    #[error("unauthenticated: {message}")]
    Unauthenticated { message: String, data: Value },

    /// A 4xx other than 401.
    #[error("request rejected with status {status}: {message}")]
    Validation { status: u16, message: String, data: Value },

    /// A 5xx, or any other non-success status.
    #[error("server failed with status {status}: {message}")]
    Server { status: u16, message: String, data: Value },

    /// The response body did not match the expected shape.
    #[error("response decode failed: {0}")]
    Decode(String),
}

/// Stable error shape handed to notification collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub status: u16,
    pub message: String,
    pub data: Value,
}

impl ApiError {
    /// Classify a non-success response by status code.
    pub(crate) fn from_status(status: u16, data: Value) -> Self {
        let message = failure_message(&data);
        match status {
            401 => Self::Unauthenticated { message, data },
            400..=499 => Self::Validation { status, message, data },
            _ => Self::Server { status, message, data },
        }
    }

    pub(crate) fn session_expired() -> Self {
        Self::Unauthenticated { message: "session expired; log in again".to_owned(), data: Value::Null }
    }

    /// HTTP status, or `None` when no response was received or decoded.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthenticated { .. } => Some(401),
            Self::Validation { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::Network(_) | Self::Decode(_) => None,
        }
    }

    #[must_use]
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated { .. })
    }

    #[must_use]
    pub fn payload(&self) -> ErrorPayload {
        match self {
            Self::Unauthenticated { message, data } => {
                ErrorPayload { status: 401, message: message.clone(), data: data.clone() }
            }
            Self::Validation { status, message, data } | Self::Server { status, message, data } => {
                ErrorPayload { status: *status, message: message.clone(), data: data.clone() }
            }
            Self::Network(message) | Self::Decode(message) => {
                ErrorPayload { status: 0, message: message.clone(), data: Value::Null }
            }
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// `payload.message` when present, else the text payload, else a fixed fallback.
pub(crate) fn failure_message(data: &Value) -> String {
    match data {
        Value::Object(map) => match map.get("message") {
            Some(Value::String(message)) if !message.is_empty() => message.clone(),
            _ => DEFAULT_FAILURE_MESSAGE.to_owned(),
        },
        Value::String(text) if !text.is_empty() => text.clone(),
        _ => DEFAULT_FAILURE_MESSAGE.to_owned(),
    }
}

/// Errors raised while building the client from configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
