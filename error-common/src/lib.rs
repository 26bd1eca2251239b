//! Common error handling utilities for the ConsultaLive transcription engine
//!
//! This crate provides the error taxonomy shared by the real-time
//! transcription components. The categories are deliberately small and map
//! one-to-one onto how the consuming UI must react to a failure:
//!
//! - **Configuration**: missing or invalid credentials, unsupported
//!   configuration combination. Fatal, never retried, no connection attempt
//!   is made.
//! - **DeviceUnavailable**: microphone permission denied or no input device.
//!   Fatal for the session but recoverable by user action; kept distinct
//!   from stream errors so the UI can prompt for permission instead of
//!   retrying the network.
//! - **Transport**: abnormal socket closure, mid-session authentication
//!   rejection, quota exhaustion. Recoverable by a caller-initiated retry;
//!   the engine never reconnects on its own.
//! - **Protocol**: malformed message from the transcription service. Logged
//!   and dropped, processing continues.
//!
//! # Example
//!
//! ```rust
//! use error_common::{TranscribeError, codes};
//!
//! let err = TranscribeError::Configuration("missing API key".to_string());
//! assert!(err.is_fatal());
//! assert!(!err.is_retryable());
//! assert_eq!(err.code(), codes::CONFIGURATION);
//! ```

pub mod codes;
pub mod types;

pub use types::*;
