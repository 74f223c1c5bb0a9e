//! Error types for mdenrich.
//!
//! Library crates use [`EnrichError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all mdenrich operations.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to an upstream service.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed upstream payload or input file.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A data-model invariant was violated (alt text, link count, ...).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The rendered document failed a structural acceptance rule.
    #[error("structural validation failed [{rule}]: {message}")]
    StructuralValidation { rule: &'static str, message: String },

    /// The selector could not produce a usable selection.
    #[error("selector error: {0}")]
    Selector(String),

    /// The quality reviewer failed to produce a verdict.
    #[error("review error: {0}")]
    Review(String),

    /// Every attempt was rejected.
    #[error("enrichment not accepted after {attempts} attempt(s)")]
    MaxAttemptsExceeded { attempts: u32 },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, EnrichError>;

impl EnrichError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a structural validation error for the named rule.
    pub fn structural(rule: &'static str, msg: impl Into<String>) -> Self {
        Self::StructuralValidation {
            rule,
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = EnrichError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = EnrichError::validation("exactly two links are required");
        assert!(err.to_string().contains("two links"));
    }

    #[test]
    fn structural_error_names_rule() {
        let err = EnrichError::structural("hero_present", "hero image not found in output");
        assert_eq!(
            err.to_string(),
            "structural validation failed [hero_present]: hero image not found in output"
        );
    }

    #[test]
    fn max_attempts_display() {
        let err = EnrichError::MaxAttemptsExceeded { attempts: 3 };
        assert_eq!(err.to_string(), "enrichment not accepted after 3 attempt(s)");
    }
}
