//! Result type definition and extension traits.
//!
//! Provides combinators for results whose errors are logged rather than
//! propagated, such as background work that must keep running.

use std::fmt::Display;

use crate::error::Error;

/// The standard Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for results that may be consumed after logging.
///
/// Implemented for any error type that can be displayed, so the tracker and
/// web crates can use it with their own error enums.
pub trait ResultExt<T> {
    /// Convert a Result to an Option, logging the error if present.
    fn into_option_logged(self) -> Option<T>;

    /// Log the error at warn level with some context, then return self.
    #[must_use]
    fn warn_on_err(self, context: &str) -> Self;
}

impl<T, E: Display> ResultExt<T> for std::result::Result<T, E> {
    fn into_option_logged(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Operation failed: {}", e);
                None
            }
        }
    }

    fn warn_on_err(self, context: &str) -> Self {
        if let Err(ref e) = self {
            tracing::warn!(error = %e, "{}", context);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_into_option_ok() {
        let result: Result<i32> = Ok(42);
        assert_eq!(result.into_option_logged(), Some(42));
    }

    #[test]
    fn test_result_into_option_err() {
        let result: Result<i32> = Err(Error::invalid_config("server.bind_address", "empty"));
        assert_eq!(result.into_option_logged(), None);
    }

    #[test]
    fn test_warn_on_err_passes_through() {
        let ok: std::result::Result<u32, String> = Ok(3);
        assert_eq!(ok.warn_on_err("context"), Ok(3));
        let err: std::result::Result<u32, String> = Err("boom".to_string());
        assert_eq!(err.warn_on_err("context"), Err("boom".to_string()));
    }
}
