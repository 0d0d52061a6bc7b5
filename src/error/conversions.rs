//! Type Conversions for CallError
//!
//! This module contains From trait implementations for converting
//! common error types into CallError.

use super::types::CallError;

impl From<reqwest::Error> for CallError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::ParseError(err.to_string())
        } else {
            Self::TransportError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CallError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let call_err: CallError = json_err.into();
        assert!(matches!(call_err, CallError::ParseError(_)));
    }
}
