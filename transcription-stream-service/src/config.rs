use std::time::Duration;

use serde::{Deserialize, Serialize};

use error_common::{Result, TranscribeError};

/// Chunk-duration tiers and stream pacing knobs.
///
/// Loaded once at startup and treated as immutable for the session. The four
/// millisecond tiers correspond to the network-condition tiers of the
/// quality estimator; the keep-alive interval paces the no-op control
/// message that prevents idle-timeout disconnection by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunkConfig {
    pub stable_ms: u32,
    pub moderate_ms: u32,
    pub poor_ms: u32,
    pub default_ms: u32,
    pub keepalive_interval: Duration,
    pub target_bitrate: u32,
}

impl Default for AudioChunkConfig {
    fn default() -> Self {
        Self {
            stable_ms: 250,
            moderate_ms: 500,
            poor_ms: 1000,
            default_ms: 500,
            keepalive_interval: Duration::from_secs(3),
            target_bitrate: 128_000,
        }
    }
}

impl AudioChunkConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            stable_ms: env_parse("TRANSCRIBE_CHUNK_STABLE_MS", defaults.stable_ms),
            moderate_ms: env_parse("TRANSCRIBE_CHUNK_MODERATE_MS", defaults.moderate_ms),
            poor_ms: env_parse("TRANSCRIBE_CHUNK_POOR_MS", defaults.poor_ms),
            default_ms: env_parse("TRANSCRIBE_CHUNK_DEFAULT_MS", defaults.default_ms),
            keepalive_interval: Duration::from_millis(env_parse(
                "TRANSCRIBE_KEEPALIVE_MS",
                defaults.keepalive_interval.as_millis() as u64,
            )),
            target_bitrate: env_parse("TRANSCRIBE_TARGET_BITRATE", defaults.target_bitrate),
        }
    }
}

/// Configuration for one streaming session against the transcription
/// service.
///
/// Model, language and feature flags are opaque pass-through parameters:
/// they are forwarded to the service in the connection handshake and never
/// interpreted locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// WebSocket endpoint of the transcription service.
    pub endpoint: String,
    /// Bearer credential, supplied once at connect time.
    pub api_key: Option<String>,
    pub model: String,
    pub language: String,
    pub punctuate: bool,
    pub numerals: bool,
    pub filler_words: bool,
    /// Ask the service for per-word speaker tags. The tags are unreliable
    /// and only feed the inference engine's fallback signal.
    pub diarize: bool,
    /// Request interim (non-final) results for live preview.
    pub interim_results: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://api.deepgram.com/v1/listen".to_string(),
            api_key: None,
            model: "nova-2".to_string(),
            language: "pt-BR".to_string(),
            punctuate: true,
            numerals: true,
            filler_words: true,
            diarize: true,
            interim_results: true,
        }
    }
}

impl StreamConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: std::env::var("TRANSCRIBE_ENDPOINT").unwrap_or(defaults.endpoint),
            api_key: std::env::var("TRANSCRIBE_API_KEY").ok().filter(|k| !k.is_empty()),
            model: std::env::var("TRANSCRIBE_MODEL").unwrap_or(defaults.model),
            language: std::env::var("TRANSCRIBE_LANGUAGE").unwrap_or(defaults.language),
            punctuate: env_parse("TRANSCRIBE_PUNCTUATE", defaults.punctuate),
            numerals: env_parse("TRANSCRIBE_NUMERALS", defaults.numerals),
            filler_words: env_parse("TRANSCRIBE_FILLER_WORDS", defaults.filler_words),
            diarize: env_parse("TRANSCRIBE_DIARIZE", defaults.diarize),
            interim_results: env_parse("TRANSCRIBE_INTERIM_RESULTS", defaults.interim_results),
        }
    }

    /// Credential check performed before any socket is opened.
    pub fn require_api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(TranscribeError::Configuration(
                "transcription API key is not configured".to_string(),
            )),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
