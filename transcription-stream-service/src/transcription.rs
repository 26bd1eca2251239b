use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Conversational role assigned to a virtual speaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerRole {
    Doctor,
    Patient,
    Unknown,
}

impl SpeakerRole {
    /// Display name rendered in the formatted transcript.
    pub fn display_name(&self) -> &'static str {
        match self {
            SpeakerRole::Doctor => "Médico",
            SpeakerRole::Patient => "Paciente",
            SpeakerRole::Unknown => "Participante",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, SpeakerRole::Unknown)
    }
}

/// A virtual speaker registered by the inference engine.
///
/// Ids are engine-assigned and monotonically increasing; they are
/// independent of (and more trustworthy than) the transcription service's
/// own per-word speaker tags. Once `role` is set to Doctor or Patient it is
/// frozen for the rest of the session; only an explicit manual override
/// changes it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Speaker {
    pub id: u64,
    pub role: SpeakerRole,
    pub display_name: String,
}

impl Speaker {
    pub fn new(id: u64, role: SpeakerRole) -> Self {
        Self {
            id,
            role,
            display_name: role.display_name().to_string(),
        }
    }
}

/// A single inbound transcript message, already decoded from the wire.
///
/// Transient: consumed immediately by the latency monitor and the speaker
/// role inference engine, never persisted.
#[derive(Debug, Clone)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
    /// Upstream per-word speaker tag, when the service provides one. Known
    /// to be unreliable; used only as a turn-order fallback signal.
    pub speaker_hint: Option<u32>,
    pub confidence: Option<f32>,
    pub received_at: DateTime<Utc>,
}

/// One finalized, role-attributed line of the consultation transcript.
///
/// The speaker is embedded as a by-value snapshot taken at creation time so
/// that later speaker mutation (manual overrides) can never retroactively
/// rewrite the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionSegment {
    pub id: u64,
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub confidence: Option<f32>,
}

/// Aggregated per-speaker view, recomputed on demand from the segment log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerStats {
    pub speaker: Speaker,
    pub word_count: usize,
    pub segment_count: usize,
    pub avg_confidence: Option<f32>,
}

/// Update pushed across the consumer boundary for each processed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptUpdate {
    pub text: String,
    pub is_final: bool,
    pub speaker_id: Option<u64>,
    pub confidence: Option<f32>,
}

/// Consultation session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Active,
    Completed,
    Error,
}

/// Serializable summary of a consultation session, for diagnostics display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub segment_count: usize,
    pub speaker_count: usize,
}
