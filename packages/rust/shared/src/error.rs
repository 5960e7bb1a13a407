//! Error types for manifestgen.
//!
//! Library crates use [`ManifestGenError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all manifestgen operations.
#[derive(Debug, thiserror::Error)]
pub enum ManifestGenError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Unsafe or unjoinable path (e.g. traversal outside the manifests base).
    #[error("path error: {message}")]
    Path { message: String },

    /// Transport-level HTTP failure talking to the release API.
    #[error("network error: {0}")]
    Network(String),

    /// The release API answered with a status we do not handle.
    #[error("release API returned an unexpected status code ({status}) for {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// The release API response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// Downloading or extracting the release archive failed.
    #[error("fetch error: {url}: {message}")]
    Fetch { url: String, message: String },

    /// A bounded operation exceeded its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// The overlay declaration could not be generated.
    #[error("generation error: {0}")]
    Generation(String),

    /// Flattening base + overlays into a single stream failed.
    #[error("build error: {0}")]
    Build(String),

    /// The builder reported success but its output could not be read back.
    #[error("failed to read build output {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad namespace, empty file name, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ManifestGenError>;

impl ManifestGenError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a path error from any displayable message.
    pub fn path(msg: impl Into<String>) -> Self {
        Self::Path {
            message: msg.into(),
        }
    }

    /// Create a fetch error for the given archive URL.
    pub fn fetch(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
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
        let err = ManifestGenError::path("'../etc' escapes the manifests base");
        assert_eq!(
            err.to_string(),
            "path error: '../etc' escapes the manifests base"
        );

        let err = ManifestGenError::UnexpectedStatus {
            status: 500,
            url: "https://api.example.com/releases/tags/v1.0.0".into(),
        };
        assert!(err.to_string().contains("(500)"));
    }

    #[test]
    fn timeout_mentions_operation() {
        let err = ManifestGenError::Timeout {
            operation: "fetch".into(),
            after: Duration::from_secs(2),
        };
        assert_eq!(err.to_string(), "fetch timed out after 2s");
    }
}
