use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codes;

/// Error taxonomy for the streaming transcription core.
///
/// Each variant corresponds to a distinct user-visible recovery path; see
/// the crate-level documentation for the full policy.
#[derive(Error, Debug)]
pub enum TranscribeError {
    /// Missing/invalid credentials or an unsupported configuration
    /// combination. Fatal, surfaced before any connection attempt.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Microphone permission denied or no input device present.
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Stream-level failure: abnormal closure, auth rejection, quota
    /// exhaustion. The caller decides whether to retry.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed message from the transcription service. The offending
    /// event is dropped and processing continues.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type alias for transcription engine operations.
pub type Result<T> = std::result::Result<T, TranscribeError>;

/// How a failure should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// Session cannot continue without user or operator intervention.
    Fatal,
    /// Session cannot continue but a caller-initiated retry may succeed.
    Recoverable,
    /// Logged and skipped; the session keeps running.
    Transient,
}

impl TranscribeError {
    /// Stable category code for API responses and log correlation.
    pub fn code(&self) -> &'static str {
        match self {
            TranscribeError::Configuration(_) => codes::CONFIGURATION,
            TranscribeError::DeviceUnavailable(_) => codes::DEVICE_UNAVAILABLE,
            TranscribeError::Transport(_) => codes::TRANSPORT,
            TranscribeError::Protocol(_) => codes::PROTOCOL,
        }
    }

    /// Category name used as a structured logging field.
    pub fn category(&self) -> &'static str {
        match self {
            TranscribeError::Configuration(_) => "configuration",
            TranscribeError::DeviceUnavailable(_) => "device_unavailable",
            TranscribeError::Transport(_) => "transport",
            TranscribeError::Protocol(_) => "protocol",
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranscribeError::Configuration(_) | TranscribeError::DeviceUnavailable(_) => {
                ErrorSeverity::Fatal
            }
            TranscribeError::Transport(_) => ErrorSeverity::Recoverable,
            TranscribeError::Protocol(_) => ErrorSeverity::Transient,
        }
    }

    /// Whether the session is over for this cause.
    pub fn is_fatal(&self) -> bool {
        matches!(self.severity(), ErrorSeverity::Fatal)
    }

    /// Whether a caller-initiated retry is a sensible reaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self.severity(), ErrorSeverity::Recoverable)
    }
}

/// Log an error with its category and code as structured fields.
///
/// Error messages may embed service-reported causes; transcript content is
/// never part of an error message, so these are safe to ship to log sinks.
pub fn log_error(context: &str, error: &TranscribeError) {
    tracing::error!(
        context = context,
        error_code = error.code(),
        error_category = error.category(),
        error = %error,
        "transcription error"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_matches_taxonomy() {
        assert!(TranscribeError::Configuration("x".into()).is_fatal());
        assert!(TranscribeError::DeviceUnavailable("x".into()).is_fatal());
        assert!(TranscribeError::Transport("x".into()).is_retryable());
        assert_eq!(
            TranscribeError::Protocol("x".into()).severity(),
            ErrorSeverity::Transient
        );
    }

    #[test]
    fn codes_are_per_category() {
        assert_eq!(
            TranscribeError::Configuration("x".into()).code(),
            codes::CONFIGURATION
        );
        assert_eq!(
            TranscribeError::Protocol("x".into()).code(),
            codes::PROTOCOL
        );
    }
}
