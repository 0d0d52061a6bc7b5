//! Core error types.

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CallError>;

/// Coarse classification of a [`CallError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The call could not complete (network, I/O).
    Transport,
    /// The call completed but the server reported a client error (4xx).
    Client,
    /// The call completed but the server reported a server error (5xx).
    Server,
    /// The call was cancelled.
    Canceled,
    /// A subscriber rejected a signal.
    Consumer,
    /// The payload could not be decoded.
    Parsing,
    /// Invalid adapter or call configuration.
    Configuration,
    /// Anything else.
    Unknown,
}

/// A completed call whose status was not in the 2xx range.
///
/// Carries the parts of the original response that survive without its
/// payload type: status, headers and the raw error body.
#[derive(Debug, Clone)]
pub struct HttpError {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<String>,
}

impl HttpError {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Option<String>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Numeric status code, e.g. `404`.
    pub fn code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Canonical reason phrase for the status, or an empty string.
    pub fn message(&self) -> &str {
        self.status.canonical_reason().unwrap_or("")
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw body of the unsuccessful response, when one was read.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP {} {}", self.code(), self.message())
    }
}

/// Errors produced by calls, bridges and adapters.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// The call could not complete.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The call completed with a non-2xx status.
    #[error("Unsuccessful response: {0}")]
    UnsuccessfulResponse(HttpError),

    /// The call was cancelled before it completed.
    #[error("Call canceled")]
    Canceled,

    /// A subscriber failed while consuming a signal.
    #[error("Consumer error: {0}")]
    ConsumerError(String),

    /// A single-valued view completed without a value.
    #[error("Source completed without emitting a value")]
    NoSuchElement,

    /// The response payload could not be decoded.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Invalid adapter configuration or misuse of a call.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Two failures that could not be delivered separately.
    #[error("Multiple errors: {primary}; {secondary}")]
    Composite {
        primary: Box<CallError>,
        secondary: Box<CallError>,
    },
}

impl CallError {
    /// Join two failures into one.
    pub fn composite(primary: CallError, secondary: CallError) -> Self {
        Self::Composite {
            primary: Box::new(primary),
            secondary: Box::new(secondary),
        }
    }

    /// Status code carried by an unsuccessful response, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::UnsuccessfulResponse(http) => Some(http.code()),
            _ => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::TransportError(_) => ErrorCategory::Transport,
            Self::UnsuccessfulResponse(http) if http.status().is_server_error() => {
                ErrorCategory::Server
            }
            Self::UnsuccessfulResponse(http) if http.status().is_client_error() => {
                ErrorCategory::Client
            }
            Self::UnsuccessfulResponse(_) => ErrorCategory::Unknown,
            Self::Canceled => ErrorCategory::Canceled,
            Self::ConsumerError(_) => ErrorCategory::Consumer,
            Self::ParseError(_) => ErrorCategory::Parsing,
            Self::ConfigurationError(_) => ErrorCategory::Configuration,
            Self::NoSuchElement | Self::Composite { .. } => ErrorCategory::Unknown,
        }
    }

    /// Whether a fresh attempt of the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransportError(_) => true,
            Self::UnsuccessfulResponse(http) => {
                http.status().is_server_error() || http.code() == 429
            }
            _ => false,
        }
    }
}
