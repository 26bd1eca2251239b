//! Lifecycle of the bidirectional stream to the transcription service.

pub mod client;
pub mod protocol;

pub use client::{ConnectionState, TranscriptionStreamClient};
pub use protocol::{decode_transcript, ControlMessage};
