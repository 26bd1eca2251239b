use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, trace};

use crate::speaker::rules::{classify, Classification, TurnContext};
use crate::transcription::{Speaker, SpeakerRole, SpeakerStats, TranscriptionSegment};

/// The interim preview: at most one outstanding non-final span, keyed by
/// the virtual speaker it is attributed to.
#[derive(Debug, Clone)]
struct InterimPreview {
    speaker_id: u64,
    text: String,
}

/// Online speaker-role inference over raw transcript events.
///
/// Upstream per-word speaker tags are unreliable (they may report one
/// constant id for all speech), so speaker turns are derived primarily from
/// lexical content heuristics, falling back to upstream hints and
/// turn-order priors only when content is ambiguous. The engine maintains
/// its own virtual speaker identity: a turn boundary is detected only when
/// the heuristics produce a different, non-Unknown role than the previously
/// confirmed one.
#[derive(Debug, Default)]
pub struct SpeakerRoleInferenceEngine {
    speakers: BTreeMap<u64, Speaker>,
    segments: Vec<TranscriptionSegment>,
    interim: Option<InterimPreview>,
    current_speaker_id: Option<u64>,
    next_speaker_id: u64,
    next_segment_id: u64,
    last_hint: Option<u32>,
    saw_utterance: bool,
}

impl SpeakerRoleInferenceEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one transcript event.
    ///
    /// Non-final events update the single interim preview slot and are
    /// never appended to the segment log; a final event clears the preview
    /// and appends an immutable segment. Returns the appended segment, if
    /// any.
    ///
    /// Empty or whitespace-only text is silently ignored: silence-only
    /// audio windows produce such events in normal operation. A final event
    /// still supersedes the outstanding interim preview even when its text
    /// is empty, so no stale preview line outlives a finalized utterance.
    pub fn process_transcription(
        &mut self,
        text: &str,
        speaker_hint: Option<u32>,
        is_final: bool,
        confidence: Option<f32>,
    ) -> Option<&TranscriptionSegment> {
        if is_final {
            self.interim = None;
        }
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        let lowercased = trimmed.to_lowercase();
        let ctx = self.turn_context(speaker_hint);
        let classification = classify(&lowercased, &ctx);
        self.saw_utterance = true;
        if speaker_hint.is_some() {
            self.last_hint = speaker_hint;
        }

        let speaker_id = self.resolve_speaker(&classification);

        if !is_final {
            self.interim = Some(InterimPreview {
                speaker_id,
                text: trimmed.to_string(),
            });
            trace!(speaker_id, chars = trimmed.len(), "interim preview updated");
            return None;
        }

        let speaker = self
            .speakers
            .get(&speaker_id)
            .cloned()
            .unwrap_or_else(|| Speaker::new(speaker_id, SpeakerRole::Unknown));
        let segment = TranscriptionSegment {
            id: self.next_segment_id,
            speaker,
            text: trimmed.to_string(),
            timestamp: Utc::now(),
            confidence,
        };
        self.next_segment_id += 1;
        debug!(
            segment_id = segment.id,
            speaker_id,
            chars = segment.text.len(),
            "segment appended"
        );
        self.segments.push(segment);
        self.segments.last()
    }

    /// Manual role override. Always wins over heuristics for that id from
    /// this point forward; segments already appended keep the snapshot they
    /// were created with.
    pub fn set_speaker_role(&mut self, speaker_id: u64, role: SpeakerRole, name: Option<String>) {
        if let Some(speaker) = self.speakers.get_mut(&speaker_id) {
            speaker.role = role;
            speaker.display_name = name.unwrap_or_else(|| role.display_name().to_string());
            debug!(speaker_id, ?role, "speaker role overridden");
        }
    }

    /// Per-speaker aggregates, recomputed from the segment log.
    pub fn speaker_stats(&self) -> Vec<SpeakerStats> {
        self.speakers
            .values()
            .map(|speaker| {
                let segments: Vec<&TranscriptionSegment> = self
                    .segments
                    .iter()
                    .filter(|s| s.speaker.id == speaker.id)
                    .collect();
                let word_count = segments
                    .iter()
                    .map(|s| s.text.split_whitespace().count())
                    .sum();
                let confidences: Vec<f32> =
                    segments.iter().filter_map(|s| s.confidence).collect();
                let avg_confidence = if confidences.is_empty() {
                    None
                } else {
                    Some(confidences.iter().sum::<f32>() / confidences.len() as f32)
                };
                SpeakerStats {
                    speaker: speaker.clone(),
                    word_count,
                    segment_count: segments.len(),
                    avg_confidence,
                }
            })
            .collect()
    }

    /// Render the final log plus, if present, one trailing interim line.
    pub fn formatted_transcript(&self) -> String {
        let mut lines: Vec<String> = self
            .segments
            .iter()
            .map(|s| format!("{}: {}", s.speaker.display_name, s.text))
            .collect();
        if let Some(preview) = &self.interim {
            let name = self
                .speakers
                .get(&preview.speaker_id)
                .map(|s| s.display_name.as_str())
                .unwrap_or_else(|| SpeakerRole::Unknown.display_name());
            lines.push(format!("{}: {}...", name, preview.text));
        }
        lines.join("\n")
    }

    /// Append-only view of the finalized segment log.
    pub fn segments(&self) -> &[TranscriptionSegment] {
        &self.segments
    }

    /// Registered virtual speakers in id order.
    pub fn speakers(&self) -> Vec<&Speaker> {
        self.speakers.values().collect()
    }

    /// Virtual speaker the next ambiguous utterance would be attributed to.
    pub fn current_speaker_id(&self) -> Option<u64> {
        self.current_speaker_id
    }

    /// Drop all speakers, segments, counters, and the interim preview.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn turn_context(&self, speaker_hint: Option<u32>) -> TurnContext {
        let hint_changed = matches!(
            (speaker_hint, self.last_hint),
            (Some(hint), Some(last)) if hint != last
        );
        let sole_speaker_role = if self.speakers.len() == 1 {
            self.speakers.values().next().map(|s| s.role)
        } else {
            None
        };
        TurnContext {
            first_utterance: !self.saw_utterance,
            hint_changed,
            sole_speaker_role,
        }
    }

    /// Apply virtual-speaker continuity to a classification and return the
    /// id the utterance is attributed to.
    fn resolve_speaker(&mut self, classification: &Classification) -> u64 {
        let current = match self.current_speaker_id {
            None => {
                // First speaker of the session, whatever the role.
                return self.register_speaker(classification.role);
            }
            Some(id) => id,
        };

        let current_role = self
            .speakers
            .get(&current)
            .map(|s| s.role)
            .unwrap_or(SpeakerRole::Unknown);

        if !classification.role.is_known() {
            // Unknown never triggers a turn boundary; the utterance is
            // attributed to the current virtual speaker.
            return current;
        }

        if !current_role.is_known() {
            // Upgrade from Unknown exactly once; never a new speaker.
            if let Some(speaker) = self.speakers.get_mut(&current) {
                speaker.role = classification.role;
                speaker.display_name = classification.role.display_name().to_string();
                debug!(speaker_id = current, role = ?classification.role, "speaker role confirmed");
            }
            return current;
        }

        if current_role == classification.role {
            return current;
        }

        // A different confirmed role means the other party is talking.
        self.register_speaker(classification.role)
    }

    fn register_speaker(&mut self, role: SpeakerRole) -> u64 {
        let id = self.next_speaker_id;
        self.next_speaker_id += 1;
        self.speakers.insert(id, Speaker::new(id, role));
        self.current_speaker_id = Some(id);
        debug!(speaker_id = id, ?role, "virtual speaker registered");
        id
    }
}
