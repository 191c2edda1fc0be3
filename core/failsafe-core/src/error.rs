//! Error types for failsafe-core operations.
//!
//! Nothing in the watchdog is allowed to be fatal: these errors are returned by
//! the low-level store and action helpers, and callers log them and fall back.

use std::path::PathBuf;

/// All errors that can occur in failsafe-core operations.
#[derive(Debug, thiserror::Error)]
pub enum FailsafeError {
    // ─────────────────────────────────────────────────────────────────────
    // Persistence Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid setting path: {0:?}")]
    InvalidSettingPath(String),

    // ─────────────────────────────────────────────────────────────────────
    // Companion Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Companion script not found: {0}")]
    ScriptNotFound(PathBuf),

    #[error("Command execution failed: {command}: {details}")]
    CommandFailed { command: String, details: String },
}

impl FailsafeError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        FailsafeError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        FailsafeError::Json {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using FailsafeError.
pub type Result<T> = std::result::Result<T, FailsafeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_includes_context() {
        let err = FailsafeError::io(
            "Failed to read state",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "I/O error: Failed to read state: denied");
    }

    #[test]
    fn invalid_setting_path_display() {
        let err = FailsafeError::InvalidSettingPath("a..b".to_string());
        assert_eq!(err.to_string(), "Invalid setting path: \"a..b\"");
    }
}
