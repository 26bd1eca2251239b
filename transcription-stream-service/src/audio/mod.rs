//! Microphone capture, chunk encoding, and outgoing chunk cadence.

pub mod capture;
pub mod codec;
pub mod controller;

pub use capture::{CaptureConstraints, CaptureDevice, CaptureStream};
pub use codec::{select_encoding, AudioEncoding, ChunkEncoder, Linear16Encoder};
pub use controller::AudioSourceController;

#[cfg(feature = "microphone")]
pub use capture::SystemCaptureDevice;
