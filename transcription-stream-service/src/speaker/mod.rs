//! Speaker-role inference over raw transcript events.
//!
//! Produces a stable sequence of role-tagged, deduplicated transcription
//! segments from a stream whose upstream speaker tags cannot be trusted.

pub mod engine;
pub mod rules;

pub use engine::SpeakerRoleInferenceEngine;
pub use rules::{classify, Classification, RuleConfidence, RuleKind, TurnContext};
