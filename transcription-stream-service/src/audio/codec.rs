use tracing::warn;

use error_common::Result;

/// Audio chunk encodings the stream handshake can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    /// Opus packets; bandwidth-efficient, preferred when compiled in.
    Opus,
    /// FLAC frames. In the preference table for services that accept it,
    /// but no encoder is currently compiled in.
    Flac,
    /// Raw signed 16-bit little-endian PCM. Always available.
    Linear16,
}

impl AudioEncoding {
    /// Encoding name used in the service handshake.
    pub fn wire_name(&self) -> &'static str {
        match self {
            AudioEncoding::Opus => "opus",
            AudioEncoding::Flac => "flac",
            AudioEncoding::Linear16 => "linear16",
        }
    }

    /// Whether an encoder for this format is compiled into the build.
    pub fn is_supported(&self) -> bool {
        match self {
            AudioEncoding::Opus => cfg!(feature = "opus"),
            AudioEncoding::Flac => false,
            AudioEncoding::Linear16 => true,
        }
    }
}

/// Compressed formats in preference order, most bandwidth-efficient first.
pub const ENCODING_PREFERENCE: &[AudioEncoding] = &[AudioEncoding::Opus, AudioEncoding::Flac];

/// Pick the best supported encoding.
///
/// Falls back to raw PCM with a warning when no compressed encoder is
/// available; the stream still works, it just spends more bandwidth.
pub fn select_encoding() -> AudioEncoding {
    for &candidate in ENCODING_PREFERENCE {
        if candidate.is_supported() {
            return candidate;
        }
    }
    warn!(
        fallback = AudioEncoding::Linear16.wire_name(),
        "no compressed audio encoding available, falling back to raw PCM"
    );
    AudioEncoding::Linear16
}

/// Turns fixed-duration PCM chunks into opaque wire payloads.
pub trait ChunkEncoder: Send {
    fn encoding(&self) -> AudioEncoding;
    fn encode(&mut self, pcm: &[i16]) -> Result<Vec<u8>>;
}

/// Pass-through encoder: little-endian byte view of the samples.
pub struct Linear16Encoder;

impl ChunkEncoder for Linear16Encoder {
    fn encoding(&self) -> AudioEncoding {
        AudioEncoding::Linear16
    }

    fn encode(&mut self, pcm: &[i16]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(pcm.len() * 2);
        for sample in pcm {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        Ok(out)
    }
}

#[cfg(feature = "opus")]
mod opus {
    use error_common::{Result, TranscribeError};

    use super::{AudioEncoding, ChunkEncoder};

    /// Opus encoder emitting one packet per 20 ms frame, concatenated.
    /// The service is configured for containerless opus packets.
    ///
    /// Opus requires fixed frame sizes, so samples that do not fill a whole
    /// frame are held in `pending` and encoded with the next chunk; no
    /// audio is dropped at chunk boundaries.
    pub struct OpusChunkEncoder {
        encoder: audiopus::coder::Encoder,
        frame_samples: usize,
        pending: Vec<i16>,
        out: Vec<u8>,
    }

    impl OpusChunkEncoder {
        pub fn new(sample_rate: u32, channels: u16, bitrate: u32) -> Result<Self> {
            let rate = match sample_rate {
                8_000 => audiopus::SampleRate::Hz8000,
                12_000 => audiopus::SampleRate::Hz12000,
                16_000 => audiopus::SampleRate::Hz16000,
                24_000 => audiopus::SampleRate::Hz24000,
                48_000 => audiopus::SampleRate::Hz48000,
                other => {
                    return Err(TranscribeError::Configuration(format!(
                        "opus does not support a {other} Hz sample rate"
                    )))
                }
            };
            let chan = if channels == 1 {
                audiopus::Channels::Mono
            } else {
                audiopus::Channels::Stereo
            };
            let mut encoder =
                audiopus::coder::Encoder::new(rate, chan, audiopus::Application::Voip)
                    .map_err(|e| TranscribeError::Configuration(format!("opus init: {e}")))?;
            encoder
                .set_bitrate(audiopus::Bitrate::BitsPerSecond(bitrate as i32))
                .map_err(|e| TranscribeError::Configuration(format!("opus bitrate: {e}")))?;
            Ok(Self {
                encoder,
                frame_samples: (sample_rate as usize / 50) * channels as usize,
                pending: Vec::new(),
                out: vec![0u8; 4000],
            })
        }
    }

    impl ChunkEncoder for OpusChunkEncoder {
        fn encoding(&self) -> AudioEncoding {
            AudioEncoding::Opus
        }

        fn encode(&mut self, pcm: &[i16]) -> Result<Vec<u8>> {
            self.pending.extend_from_slice(pcm);
            let mut payload = Vec::new();
            let mut consumed = 0;
            while self.pending.len() - consumed >= self.frame_samples {
                let frame = &self.pending[consumed..consumed + self.frame_samples];
                let written = self
                    .encoder
                    .encode(frame, &mut self.out)
                    .map_err(|e| TranscribeError::Transport(format!("opus encode: {e}")))?;
                payload.extend_from_slice(&self.out[..written]);
                consumed += self.frame_samples;
            }
            // The trailing partial frame stays pending until the next chunk
            // completes it.
            self.pending.drain(..consumed);
            Ok(payload)
        }
    }
}

#[cfg(feature = "opus")]
pub use opus::OpusChunkEncoder;

/// Build an encoder for the selected format.
pub fn create_encoder(
    encoding: AudioEncoding,
    sample_rate: u32,
    channels: u16,
    bitrate: u32,
) -> Result<Box<dyn ChunkEncoder>> {
    match encoding {
        AudioEncoding::Linear16 => Ok(Box::new(Linear16Encoder)),
        #[cfg(feature = "opus")]
        AudioEncoding::Opus => Ok(Box::new(OpusChunkEncoder::new(
            sample_rate,
            channels,
            bitrate,
        )?)),
        #[cfg(not(feature = "opus"))]
        AudioEncoding::Opus => {
            let _ = (sample_rate, channels, bitrate);
            Err(error_common::TranscribeError::Configuration(
                "opus encoding requested but not compiled in".to_string(),
            ))
        }
        AudioEncoding::Flac => Err(error_common::TranscribeError::Configuration(
            "no flac encoder is compiled in".to_string(),
        )),
    }
}
