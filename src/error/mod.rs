//! Error Handling Module
//!
//! This module provides the error types shared by calls, streams and adapters:
//! - Core error types (`CallError`, `HttpError`, `ErrorCategory`)
//! - Type conversions from common error types
//!
//! # Example
//!
//! ```rust,ignore
//! use callflux::error::{CallError, ErrorCategory};
//!
//! let error = CallError::TransportError("connection reset".into());
//! assert_eq!(error.category(), ErrorCategory::Transport);
//! assert!(error.is_retryable());
//! ```

// Module declarations
mod conversions;
pub mod types;

// Re-exports for public API
pub use types::*;
