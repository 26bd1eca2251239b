//! Real-time consultation transcription core for ConsultaLive
//!
//! Powers live consultation transcription for the practice copilot: a
//! long-lived bidirectional stream to a speech-to-text service, adaptive
//! chunk cadence driven by observed network conditions, round-trip latency
//! monitoring, and an online heuristic classifier that assigns a stable
//! clinician/patient role to speech whose upstream speaker tags cannot be
//! trusted.
//!
//! # Components
//!
//! - [`audio::AudioSourceController`]: owns the microphone, selects the
//!   best supported chunk encoding, and cuts fixed-duration chunks.
//! - [`network::NetworkQualityEstimator`]: maps observed network
//!   conditions to chunk-duration tiers.
//! - [`stream::TranscriptionStreamClient`]: connect, authenticate,
//!   keep-alive, graceful and abnormal close of the provider stream.
//! - [`latency::LatencyMonitor`]: rolling percentiles over inter-arrival
//!   latency of finalized transcripts.
//! - [`speaker::SpeakerRoleInferenceEngine`]: role-tagged, deduplicated
//!   transcript segments with virtual speaker identity.
//! - [`session::ConsultationSession`]: one session object owning all of
//!   the above and the single serialized event path between them.
//!
//! Transcript text is protected health information: log lines carry ids
//! and lengths, never transcript content.
//!
//! # Example
//!
//! ```rust
//! use transcription_stream_service::speaker::SpeakerRoleInferenceEngine;
//!
//! let mut engine = SpeakerRoleInferenceEngine::new();
//! engine.process_transcription("Vou prescrever amoxicilina", None, true, Some(0.98));
//! assert_eq!(engine.formatted_transcript(), "Médico: Vou prescrever amoxicilina");
//! ```

pub mod audio;
pub mod config;
pub mod latency;
pub mod network;
pub mod session;
pub mod speaker;
pub mod stream;
pub mod transcription;

pub use config::{AudioChunkConfig, StreamConfig};
pub use latency::{LatencyMonitor, LatencyStats};
pub use network::{NetworkCondition, NetworkQualityEstimator};
pub use session::{ConsultationSession, TranscriptCallback};
pub use speaker::SpeakerRoleInferenceEngine;
pub use stream::{ConnectionState, TranscriptionStreamClient};
pub use transcription::{
    SessionStatus, SessionSummary, Speaker, SpeakerRole, SpeakerStats, TranscriptEvent,
    TranscriptUpdate, TranscriptionSegment,
};

pub use error_common::{Result, TranscribeError};
