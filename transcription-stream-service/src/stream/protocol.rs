//! Wire format of the transcription service boundary.
//!
//! The service speaks a Deepgram-shaped protocol: a query-string
//! configuration handshake on the WebSocket URL, binary audio frames
//! upstream, and JSON transcript messages downstream. Any field beyond the
//! four the engine consumes is treated as opaque and ignored.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use error_common::{Result, TranscribeError};

use crate::audio::codec::AudioEncoding;
use crate::config::StreamConfig;
use crate::transcription::TranscriptEvent;

/// Outbound no-op and shutdown control messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Prevents idle-timeout disconnection of a long-lived stream.
    KeepAlive,
    /// Asks the service for a clean finish before the socket is released.
    CloseStream,
}

impl ControlMessage {
    pub fn to_json(self) -> String {
        // Infallible for a unit enum; fall back to the bare tag.
        serde_json::to_string(&self).unwrap_or_else(|_| match self {
            ControlMessage::KeepAlive => r#"{"type":"KeepAlive"}"#.to_string(),
            ControlMessage::CloseStream => r#"{"type":"CloseStream"}"#.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    #[serde(rename = "type")]
    message_type: Option<String>,
    channel: Option<InboundChannel>,
    is_final: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct InboundChannel {
    alternatives: Vec<InboundAlternative>,
}

#[derive(Debug, Deserialize)]
struct InboundAlternative {
    transcript: String,
    confidence: Option<f32>,
    #[serde(default)]
    words: Vec<InboundWord>,
}

#[derive(Debug, Deserialize)]
struct InboundWord {
    speaker: Option<u32>,
}

/// Decode one inbound text frame.
///
/// Returns `Ok(None)` for well-formed non-transcript frames (metadata,
/// acknowledgements); malformed payloads are a [`TranscribeError::Protocol`]
/// so the caller can log and drop them without tearing the stream down.
pub fn decode_transcript(raw: &str) -> Result<Option<TranscriptEvent>> {
    let message: InboundMessage = serde_json::from_str(raw)
        .map_err(|e| TranscribeError::Protocol(format!("malformed transcript message: {e}")))?;

    if let Some(kind) = message.message_type.as_deref() {
        if kind != "Results" {
            return Ok(None);
        }
    }

    let channel = match message.channel {
        Some(channel) => channel,
        None => return Ok(None),
    };
    let alternative = match channel.alternatives.into_iter().next() {
        Some(alternative) => alternative,
        None => {
            return Err(TranscribeError::Protocol(
                "transcript message carries no alternatives".to_string(),
            ))
        }
    };

    let speaker_hint = alternative.words.iter().find_map(|w| w.speaker);
    Ok(Some(TranscriptEvent {
        text: alternative.transcript,
        is_final: message.is_final.unwrap_or(false),
        speaker_hint,
        confidence: alternative.confidence,
        received_at: Utc::now(),
    }))
}

/// Build the connection request: endpoint plus the negotiated configuration
/// as query parameters, authenticated with the bearer credential.
///
/// Fails fast with a configuration error when the credential is absent; no
/// socket is opened in that case.
pub fn build_request(
    config: &StreamConfig,
    encoding: AudioEncoding,
    sample_rate: u32,
    channels: u16,
) -> Result<Request> {
    let api_key = config.require_api_key()?;

    let url = format!(
        "{}?model={}&language={}&punctuate={}&numerals={}&filler_words={}&diarize={}&interim_results={}&encoding={}&sample_rate={}&channels={}",
        config.endpoint,
        config.model,
        config.language,
        config.punctuate,
        config.numerals,
        config.filler_words,
        config.diarize,
        config.interim_results,
        encoding.wire_name(),
        sample_rate,
        channels,
    );

    let mut request = url
        .into_client_request()
        .map_err(|e| TranscribeError::Configuration(format!("invalid endpoint: {e}")))?;
    let header = HeaderValue::from_str(&format!("Token {api_key}"))
        .map_err(|e| TranscribeError::Configuration(format!("invalid API key: {e}")))?;
    request.headers_mut().insert(AUTHORIZATION, header);
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_final_transcript_with_speaker_words() {
        let raw = r#"{
            "type": "Results",
            "is_final": true,
            "channel": {
                "alternatives": [{
                    "transcript": "Vou prescrever amoxicilina",
                    "confidence": 0.97,
                    "words": [
                        {"word": "vou", "speaker": 0, "start": 0.1},
                        {"word": "prescrever", "speaker": 0}
                    ]
                }]
            },
            "duration": 1.92,
            "metadata": {"request_id": "abc"}
        }"#;
        let event = decode_transcript(raw).unwrap().unwrap();
        assert_eq!(event.text, "Vou prescrever amoxicilina");
        assert!(event.is_final);
        assert_eq!(event.speaker_hint, Some(0));
        assert_eq!(event.confidence, Some(0.97));
    }

    #[test]
    fn non_transcript_frames_are_skipped() {
        let raw = r#"{"type": "Metadata", "request_id": "abc"}"#;
        assert!(decode_transcript(raw).unwrap().is_none());
    }

    #[test]
    fn malformed_payload_is_protocol_error() {
        let err = decode_transcript("{not json").unwrap_err();
        assert!(matches!(err, TranscribeError::Protocol(_)));
    }

    #[test]
    fn empty_alternatives_is_protocol_error() {
        let raw = r#"{"type": "Results", "channel": {"alternatives": []}}"#;
        assert!(decode_transcript(raw).is_err());
    }

    #[test]
    fn control_messages_serialize_to_tagged_json() {
        assert_eq!(ControlMessage::KeepAlive.to_json(), r#"{"type":"KeepAlive"}"#);
        assert_eq!(
            ControlMessage::CloseStream.to_json(),
            r#"{"type":"CloseStream"}"#
        );
    }

    #[test]
    fn request_carries_handshake_and_credential() {
        let config = StreamConfig {
            api_key: Some("secret-key".to_string()),
            ..StreamConfig::default()
        };
        let request = build_request(&config, AudioEncoding::Linear16, 16_000, 1).unwrap();
        let uri = request.uri().to_string();
        assert!(uri.contains("model=nova-2"));
        assert!(uri.contains("language=pt-BR"));
        assert!(uri.contains("encoding=linear16"));
        assert!(uri.contains("sample_rate=16000"));
        assert_eq!(
            request.headers().get(AUTHORIZATION).map(|v| v.to_str().unwrap()),
            Some("Token secret-key")
        );
    }

    #[test]
    fn missing_credential_fails_before_any_socket() {
        let config = StreamConfig::default();
        let err = build_request(&config, AudioEncoding::Linear16, 16_000, 1).unwrap_err();
        assert!(matches!(err, TranscribeError::Configuration(_)));
    }
}
