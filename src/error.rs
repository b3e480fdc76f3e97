//! # Error Handling
//!
//! Two error families live here:
//!
//! - **AppError**: errors surfaced to HTTP clients (config endpoint, WS upgrade).
//!   Implements `ResponseError` so handlers can return them directly.
//! - **BridgeError**: per-frame / per-event faults inside a live call. These are
//!   never fatal; the bridge logs them and keeps the call alive. The enum exists
//!   so diagnostics carry a structured kind instead of a bare printed string.
//!
//! ## Error Policy:
//! - Malformed transport frames: dropped, logged, connection stays open
//! - Unknown mark acknowledgements: logged, ignored
//! - Send failures: logged; only a dead connection tears the call down
//! - Tool failures: never reach this module (tools encode errors as strings)
//!
//! The only fatal condition in the whole service is invalid startup
//! configuration, which is caught by `AppConfig::validate()` before the
//! server binds.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Errors returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Server-side problems (upstream connect failures, lock poisoning)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// The upstream voice-agent session could not be established
    AgentUnavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::AgentUnavailable(msg) => write!(f, "Agent session unavailable: {}", msg),
        }
    }
}

/// Converts AppError values into JSON HTTP responses.
///
/// ## HTTP Status Code Mapping:
/// - Internal/ConfigError → 500 (Internal Server Error)
/// - BadRequest → 400 (Bad Request)
/// - AgentUnavailable → 502 (Bad Gateway)
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
            AppError::AgentUnavailable(msg) => (
                actix_web::http::StatusCode::BAD_GATEWAY,
                "agent_unavailable",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Faults that occur inside a live call.
///
/// Each variant maps to one row of the bridge's error taxonomy. Handlers log
/// these with the call id attached and continue; none of them terminate the
/// owning event loop on their own.
#[derive(Debug)]
pub enum BridgeError {
    /// A transport frame was not valid JSON or had an unexpected shape
    Frame(String),

    /// A media payload failed base64 decoding
    Payload(String),

    /// An acknowledgement arrived for a mark token with no live entry
    UnknownMark(String),

    /// A frame could not be written to the telephony connection
    Transport(String),

    /// The voice-agent session is gone (channel closed, socket dropped)
    Session(String),

    /// An operation was attempted in the wrong call phase
    Phase(String),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Frame(msg) => write!(f, "frame error: {}", msg),
            BridgeError::Payload(msg) => write!(f, "payload error: {}", msg),
            BridgeError::UnknownMark(token) => write!(f, "unknown mark acknowledgement: {}", token),
            BridgeError::Transport(msg) => write!(f, "transport error: {}", msg),
            BridgeError::Session(msg) => write!(f, "agent session error: {}", msg),
            BridgeError::Phase(msg) => write!(f, "phase error: {}", msg),
        }
    }
}

impl std::error::Error for BridgeError {}

impl BridgeError {
    /// Short machine-readable kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Frame(_) => "frame",
            BridgeError::Payload(_) => "payload",
            BridgeError::UnknownMark(_) => "unknown_mark",
            BridgeError::Transport(_) => "transport",
            BridgeError::Session(_) => "session",
            BridgeError::Phase(_) => "phase",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_kinds() {
        assert_eq!(BridgeError::Frame("x".into()).kind(), "frame");
        assert_eq!(BridgeError::UnknownMark("7".into()).kind(), "unknown_mark");
        assert_eq!(BridgeError::Session("closed".into()).kind(), "session");
    }

    #[test]
    fn test_bridge_error_display() {
        let err = BridgeError::UnknownMark("42".to_string());
        assert_eq!(err.to_string(), "unknown mark acknowledgement: 42");
    }
}
