//! Rejection taxonomy and wire-level error bodies.
//!
//! Every blocked request is answered with `{"error": <code>, "message": <text>}`
//! plus an HTTP status drawn from a fixed mapping. Rejections are outcomes,
//! never panics; internal faults degrade to fail-open (see the orchestrator).

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Short machine-readable rejection codes carried in the `error` field.
pub mod codes {
    pub const FLOOD: &str = "flood";
    pub const SUSTAINED: &str = "sustained";
    pub const HAMMERING: &str = "hammering";
    pub const BRUTE_FORCE: &str = "brute_force";
    pub const SQL_INJECTION: &str = "sql_injection";
    pub const XSS: &str = "xss";
    pub const PATH_TRAVERSAL: &str = "path_traversal";
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    pub const AUTH_REQUIRED: &str = "auth_required";

    /// A live block entry was found in the shared store.
    pub const BLOCKED: &str = "blocked";
}

/// Why a request was rejected, plus everything needed to answer it.
#[derive(Debug, Clone)]
pub struct BlockReason {
    /// Short code from [`codes`]
    pub code: &'static str,
    /// Human-readable explanation
    pub message: String,
    /// HTTP status for the response
    pub status: StatusCode,
    /// Populated for 429s; surfaces as a Retry-After header
    pub retry_after: Option<Duration>,
}

impl BlockReason {
    /// Create a rejection with an explicit status
    pub fn new(code: &'static str, message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            code,
            message: message.into(),
            status,
            retry_after: None,
        }
    }

    /// Per-second request rate exceeded
    pub fn flood(retry_after: Duration) -> Self {
        Self {
            code: codes::FLOOD,
            message: "Request rate exceeded, slow down".into(),
            status: StatusCode::TOO_MANY_REQUESTS,
            retry_after: Some(retry_after),
        }
    }

    /// Per-minute request rate exceeded
    pub fn sustained(retry_after: Duration) -> Self {
        Self {
            code: codes::SUSTAINED,
            message: "Sustained request volume exceeded".into(),
            status: StatusCode::TOO_MANY_REQUESTS,
            retry_after: Some(retry_after),
        }
    }

    /// Single endpoint hit too many times in the window
    pub fn hammering(retry_after: Duration) -> Self {
        Self {
            code: codes::HAMMERING,
            message: "Endpoint request limit exceeded".into(),
            status: StatusCode::TOO_MANY_REQUESTS,
            retry_after: Some(retry_after),
        }
    }

    /// Too many login attempts inside the detection window
    pub fn brute_force(retry_after: Duration) -> Self {
        Self {
            code: codes::BRUTE_FORCE,
            message: "Too many login attempts, try again later".into(),
            status: StatusCode::TOO_MANY_REQUESTS,
            retry_after: Some(retry_after),
        }
    }

    /// SQL injection signature matched
    pub fn sql_injection() -> Self {
        Self::new(
            codes::SQL_INJECTION,
            "Request rejected by content inspection",
            StatusCode::BAD_REQUEST,
        )
    }

    /// Cross-site scripting signature matched
    pub fn xss() -> Self {
        Self::new(
            codes::XSS,
            "Request rejected by content inspection",
            StatusCode::BAD_REQUEST,
        )
    }

    /// Directory traversal signature matched
    pub fn path_traversal() -> Self {
        Self::new(
            codes::PATH_TRAVERSAL,
            "Request path rejected",
            StatusCode::FORBIDDEN,
        )
    }

    /// Declared body size beyond the profile limit
    pub fn payload_too_large(declared: u64, max: u64) -> Self {
        Self::new(
            codes::PAYLOAD_TOO_LARGE,
            format!("Request body of {} bytes exceeds the {} byte limit", declared, max),
            StatusCode::PAYLOAD_TOO_LARGE,
        )
    }

    /// API credential missing on a protected path
    pub fn auth_required() -> Self {
        Self::new(
            codes::AUTH_REQUIRED,
            "API key or authenticated session required",
            StatusCode::UNAUTHORIZED,
        )
    }

    /// A live block entry short-circuited the pipeline
    pub fn already_blocked() -> Self {
        Self::new(
            codes::BLOCKED,
            "Access temporarily blocked",
            StatusCode::FORBIDDEN,
        )
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.status.as_u16(), self.code, self.message)
    }
}

impl std::error::Error for BlockReason {}

impl Serialize for BlockReason {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("BlockReason", 2)?;
        state.serialize_field("error", &self.code)?;
        state.serialize_field("message", &self.message)?;
        state.end()
    }
}

/// Wire shape of a blocked response body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// Short code from [`codes`]
    pub error: String,
    /// Human-readable explanation
    pub message: String,
}

/// Shield-level errors (startup and service assembly, internal use)
#[derive(Debug, thiserror::Error)]
pub enum ShieldError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::domain::config::ConfigError),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}
