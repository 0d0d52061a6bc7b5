//! One-shot call abstraction
//!
//! A [`Call`] represents a single logical request. It can be started exactly
//! once, either blocking ([`Call::execute`]) or with a completion callback
//! ([`Call::enqueue`]). Streams never start a call they were handed; they
//! start a fresh attempt obtained from [`Call::clone_call`] per subscription.

pub mod http;

use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;

use crate::error::{CallError, HttpError};

pub use http::{HttpCall, HttpRequestSpec};

/// Shared handle to a call attempt.
pub type SharedCall<T> = Arc<dyn Call<T>>;

/// A single request that yields at most one [`Response`].
pub trait Call<T>: Send + Sync {
    /// Run the request on the current thread and wait for its outcome.
    fn execute(&self) -> Result<Response<T>, CallError>;

    /// Start the request and deliver its outcome to `callback` from whatever
    /// context the implementation completes on.
    fn enqueue(&self, callback: Arc<dyn Callback<T>>);

    /// Request cancellation. Idempotent.
    fn cancel(&self);

    fn is_canceled(&self) -> bool;

    /// Whether `execute` or `enqueue` has been called on this attempt.
    fn is_executed(&self) -> bool;

    /// A new, unstarted attempt for the same request.
    fn clone_call(&self) -> SharedCall<T>;
}

/// Completion callback for [`Call::enqueue`].
///
/// Exactly one of the two methods is invoked per started call.
pub trait Callback<T>: Send + Sync {
    /// The call produced a response. Non-2xx statuses arrive here too.
    fn on_response(&self, call: &dyn Call<T>, response: Response<T>);

    /// The call could not produce a response.
    fn on_failure(&self, call: &dyn Call<T>, error: CallError);
}

/// Outcome of a completed call: status, headers and either a decoded payload
/// (2xx) or the raw error body (anything else).
#[derive(Debug, Clone)]
pub struct Response<T> {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<T>,
    error_body: Option<String>,
}

impl<T> Response<T> {
    /// A `200 OK` response carrying `body`.
    pub fn success(body: T) -> Self {
        Self::success_with(StatusCode::OK, HeaderMap::new(), body)
    }

    pub fn success_with(status: StatusCode, headers: HeaderMap, body: T) -> Self {
        Self {
            status,
            headers,
            body: Some(body),
            error_body: None,
        }
    }

    /// A successful response without a payload, e.g. `204 No Content`.
    pub fn empty(status: StatusCode, headers: HeaderMap) -> Self {
        debug_assert!(status.is_success(), "empty response with non-2xx status");
        Self {
            status,
            headers,
            body: None,
            error_body: None,
        }
    }

    /// An unsuccessful response. `status` is expected outside the 2xx range.
    pub fn error(status: StatusCode, headers: HeaderMap, error_body: Option<String>) -> Self {
        debug_assert!(!status.is_success(), "error response with 2xx status");
        Self {
            status,
            headers,
            body: None,
            error_body,
        }
    }

    /// `true` when the status is in the 2xx range.
    pub fn is_successful(&self) -> bool {
        self.status.is_success()
    }

    pub fn code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&T> {
        self.body.as_ref()
    }

    pub fn into_body(self) -> Option<T> {
        self.body
    }

    pub fn error_body(&self) -> Option<&str> {
        self.error_body.as_deref()
    }

    /// Structured error describing this response, dropping the payload.
    pub fn to_http_error(&self) -> HttpError {
        HttpError::new(self.status, self.headers.clone(), self.error_body.clone())
    }
}
