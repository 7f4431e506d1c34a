//! Error types for tavor-core.
//!
//! Every fallible operation returns one [`Error`]. Service-side failures
//! (non-2xx responses) are classified by [`classify`] into the taxonomy below;
//! transport failures pass through unmodified as [`Error::Transport`].

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Result type alias for tavor-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of remote resource a readiness wait or fast-fail refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A sandbox box.
    Box,
    /// A disk snapshot of a box.
    Snapshot,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Box => write!(f, "box"),
            Self::Snapshot => write!(f, "snapshot"),
        }
    }
}

/// Errors that can occur while talking to the sandbox service.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or rejected credentials (401).
    #[error("{message}")]
    Authentication {
        /// Human-readable message.
        message: String,
    },

    /// Generic service error for any status without a more specific kind.
    #[error("{message}")]
    Api {
        /// HTTP status returned by the service.
        status: u16,
        /// Human-readable message, or the raw body when it was not JSON.
        message: String,
        /// Machine-readable code from the body, if any.
        code: Option<String>,
    },

    /// A named resource does not exist (404 with a not-found code).
    #[error("{message}")]
    ResourceNotFound {
        /// Human-readable message.
        message: String,
        /// Machine-readable code, e.g. `box_not_found`.
        code: String,
    },

    /// Client-side deadline elapsed while waiting on a command.
    #[error("Command {command_id} timed out after {timeout_ms}ms")]
    CommandTimeout {
        /// Identifier of the command (empty if the server never assigned one).
        command_id: String,
        /// The configured deadline in milliseconds.
        timeout_ms: u64,
    },

    /// Client-side deadline elapsed while waiting on a box to become ready.
    #[error("{kind} {resource_id} failed to become ready within {timeout_secs} seconds")]
    ResourceTimeout {
        /// Which kind of resource was awaited.
        kind: ResourceKind,
        /// Identifier of the resource.
        resource_id: String,
        /// The configured deadline in seconds.
        timeout_secs: u64,
    },

    /// Too many requests (429).
    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimit {
        /// Seconds to wait before retrying; zero when the service gave no hint.
        retry_after: u64,
    },

    /// Request rejected by validation (400 with `validation_error`).
    #[error("Validation error on field '{field}': {message}")]
    Validation {
        /// Offending field, empty when the service did not name one.
        field: String,
        /// Human-readable message.
        message: String,
    },

    /// Not enough credits or quota to satisfy the request (402).
    #[error("Insufficient credits. Required: {required:.2}, Available: {available:.2}")]
    InsufficientResource {
        /// Amount the operation needs.
        required: f64,
        /// Amount currently available.
        available: f64,
    },

    /// A resource reached a terminal state that cannot become ready.
    #[error("{message}")]
    ResourceFailed {
        /// Which kind of resource failed.
        kind: ResourceKind,
        /// Identifier of the resource.
        resource_id: String,
        /// The terminal status string reported by the service.
        status: String,
        /// Formatted message including any diagnostic details.
        message: String,
    },

    /// The event stream reported an execution error for a command.
    #[error("command error: {message}")]
    CommandFailed {
        /// Identifier of the command, if known.
        command_id: String,
        /// Message from the `error` event.
        message: String,
    },

    /// The box has no hostname yet, so no public URL can be derived.
    #[error("box {box_id} does not have a hostname; ensure the box is created and running")]
    MissingHostname {
        /// Identifier of the box.
        box_id: String,
    },

    /// Invalid client or box configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// The service could not be reached or the connection failed.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error while reading a response stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build the fast-fail error for a resource stuck in a terminal state.
    pub fn resource_failed(
        kind: ResourceKind,
        resource_id: impl Into<String>,
        status: impl Into<String>,
        details: Option<&str>,
    ) -> Self {
        let resource_id = resource_id.into();
        let status = status.into();
        let mut message = format!("{kind} {resource_id} ended with status: {status}");
        if let Some(details) = details.filter(|d| !d.is_empty()) {
            message.push_str(" (");
            message.push_str(details);
            message.push(')');
        }
        Self::ResourceFailed {
            kind,
            resource_id,
            status,
            message,
        }
    }

    /// HTTP-status-equivalent code of the error, if it has one.
    ///
    /// Client-side timeouts report 408; transport-level failures report
    /// whatever status reqwest attached, usually none.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Authentication { .. } => Some(401),
            Self::Api { status, .. } => Some(*status),
            Self::ResourceNotFound { .. } => Some(404),
            Self::CommandTimeout { .. } | Self::ResourceTimeout { .. } => Some(408),
            Self::RateLimit { .. } => Some(429),
            Self::Validation { .. } => Some(400),
            Self::InsufficientResource { .. } => Some(402),
            Self::ResourceFailed { .. } => Some(409),
            Self::CommandFailed { .. } => Some(500),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Machine-readable code string of the error.
    pub fn code(&self) -> &str {
        match self {
            Self::Authentication { .. } => "authentication_error",
            Self::Api { code, .. } => code.as_deref().unwrap_or("api_error"),
            Self::ResourceNotFound { code, .. } => code.as_str(),
            Self::CommandTimeout { .. } => "command_timeout",
            Self::ResourceTimeout { kind, .. } => match kind {
                ResourceKind::Box => "box_timeout",
                ResourceKind::Snapshot => "snapshot_timeout",
            },
            Self::RateLimit { .. } => "rate_limit",
            Self::Validation { .. } => "validation_error",
            Self::InsufficientResource { .. } => "insufficient_credits",
            Self::ResourceFailed { .. } => "resource_failed",
            Self::CommandFailed { .. } => "command_error",
            Self::MissingHostname { .. } => "missing_hostname",
            Self::Config(_) => "config_error",
            Self::Cancelled => "cancelled",
            Self::Transport(_) => "transport_error",
            Self::Json(_) => "json_error",
            Self::Io(_) => "io_error",
        }
    }

    /// Seconds to wait before retrying, for rate-limit errors.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Whether the failure is plausibly transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimit { .. } | Self::Io(_) => true,
            Self::Transport(e) => e.is_connect() || e.is_timeout(),
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the service rejected the request because of the resource's
    /// current state (409), e.g. exposing a port on a box that is not running.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Api { status: 409, .. })
    }
}

/// Structured error body returned by the service on non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    /// Short error string.
    #[serde(default)]
    pub error: String,
    /// Longer message; preferred over `error` when present.
    #[serde(default)]
    pub message: String,
    /// Machine-readable discriminator.
    #[serde(default)]
    pub code: Option<String>,
    /// Offending field for validation errors.
    #[serde(default)]
    pub field: Option<String>,
    /// Retry hint for rate-limit errors, in seconds.
    #[serde(default)]
    pub retry_after: Option<u64>,
    /// Required amount for insufficient-credit errors.
    #[serde(default)]
    pub required: Option<f64>,
    /// Available amount for insufficient-credit errors.
    #[serde(default)]
    pub available: Option<f64>,
}

impl ErrorBody {
    fn text(&self) -> String {
        if self.message.is_empty() {
            self.error.clone()
        } else {
            self.message.clone()
        }
    }
}

/// Classify a non-2xx response into the error taxonomy.
///
/// `retry_after` is the parsed `Retry-After` header, which takes precedence
/// over a `retry_after` body field.
pub fn classify(status: u16, body: &ErrorBody, retry_after: Option<u64>) -> Error {
    let message = body.text();
    let code = body.code.as_deref().filter(|c| !c.is_empty());

    match status {
        401 => Error::Authentication { message },
        402 => Error::InsufficientResource {
            required: body.required.unwrap_or(0.0),
            available: body.available.unwrap_or(0.0),
        },
        404 => match code {
            Some(c) if c == "not_found" || c.ends_with("_not_found") => Error::ResourceNotFound {
                message,
                code: c.to_string(),
            },
            _ => Error::Api {
                status,
                message,
                code: code.map(str::to_string),
            },
        },
        429 => Error::RateLimit {
            retry_after: retry_after.or(body.retry_after).unwrap_or(0),
        },
        400 if code == Some("validation_error") => Error::Validation {
            field: body.field.clone().unwrap_or_default(),
            message,
        },
        _ => Error::Api {
            status,
            message,
            code: code.map(str::to_string),
        },
    }
}

/// Classify a raw response body.
///
/// A body that is not a JSON error object degrades to [`Error::Api`] carrying
/// the status and the raw text.
pub fn classify_raw(status: u16, raw: &str, retry_after: Option<u64>) -> Error {
    match serde_json::from_str::<ErrorBody>(raw) {
        Ok(body) => classify(status, &body, retry_after),
        Err(_) => Error::Api {
            status,
            message: format!("API generic error: {raw}"),
            code: None,
        },
    }
}
