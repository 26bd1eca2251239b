use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use error_common::Result;

use crate::audio::capture::{CaptureConstraints, CaptureDevice};
use crate::audio::codec::{create_encoder, select_encoding, AudioEncoding, ChunkEncoder};

/// Owns the capture device and emits fixed-duration encoded audio chunks.
///
/// Chunk boundaries are cut by elapsed wall-clock time, not by speech
/// boundaries; pause detection is not this component's concern.
pub struct AudioSourceController {
    device: Box<dyn CaptureDevice>,
    constraints: CaptureConstraints,
    target_bitrate: u32,
    out: mpsc::UnboundedSender<Vec<u8>>,
    encoding: AudioEncoding,
    negotiated: Option<(u32, u16)>,
    chunk_duration_ms: u32,
    stop_tx: Option<mpsc::UnboundedSender<()>>,
    task: Option<JoinHandle<()>>,
}

impl AudioSourceController {
    /// `out` receives the encoded chunks; the session forwards them to the
    /// stream client.
    pub fn new(
        device: Box<dyn CaptureDevice>,
        constraints: CaptureConstraints,
        target_bitrate: u32,
        out: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Self {
        Self {
            device,
            constraints,
            target_bitrate,
            out,
            encoding: select_encoding(),
            negotiated: None,
            chunk_duration_ms: 0,
            stop_tx: None,
            task: None,
        }
    }

    /// Acquire the device and start emitting chunks at the given cadence.
    pub fn start(&mut self, chunk_duration_ms: u32) -> Result<()> {
        if self.task.is_some() {
            return Ok(());
        }

        let mut stream = self.device.open(&self.constraints)?;
        let mut encoder = create_encoder(
            self.encoding,
            stream.sample_rate,
            stream.channels,
            self.target_bitrate,
        )?;
        self.negotiated = Some((stream.sample_rate, stream.channels));
        self.chunk_duration_ms = chunk_duration_ms;

        let (stop_tx, mut stop_rx) = mpsc::unbounded_channel();
        let out = self.out.clone();
        let task = tokio::spawn(async move {
            let mut cadence =
                tokio::time::interval(Duration::from_millis(chunk_duration_ms.max(1) as u64));
            cadence.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so the first
            // chunk spans a full duration.
            cadence.tick().await;

            let mut buffer: Vec<i16> = Vec::new();
            loop {
                tokio::select! {
                    frame = stream.frames.recv() => match frame {
                        Some(frame) => buffer.extend_from_slice(&frame),
                        None => {
                            // Device went away; flush what we have.
                            flush(&mut buffer, encoder.as_mut(), &out);
                            break;
                        }
                    },
                    _ = cadence.tick() => {
                        flush(&mut buffer, encoder.as_mut(), &out);
                    }
                    _ = stop_rx.recv() => {
                        flush(&mut buffer, encoder.as_mut(), &out);
                        break;
                    }
                }
            }
        });

        self.stop_tx = Some(stop_tx);
        self.task = Some(task);
        info!(
            chunk_duration_ms,
            encoding = self.encoding.wire_name(),
            "audio capture started"
        );
        Ok(())
    }

    /// Flush buffered audio and release the device. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.device.close();
        debug!("audio capture stopped");
    }

    /// Hot-swap the chunk cadence.
    ///
    /// Implemented by stopping and restarting capture: buffered audio is
    /// flushed first, but up to one chunk duration of device output can be
    /// lost in the gap. Known limitation.
    pub async fn set_chunk_duration(&mut self, chunk_duration_ms: u32) -> Result<()> {
        if self.task.is_none() {
            self.chunk_duration_ms = chunk_duration_ms;
            return Ok(());
        }
        if chunk_duration_ms == self.chunk_duration_ms {
            return Ok(());
        }
        info!(
            from_ms = self.chunk_duration_ms,
            to_ms = chunk_duration_ms,
            "restarting capture with new chunk duration"
        );
        self.stop().await;
        self.start(chunk_duration_ms)
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Encoding declared in the stream handshake.
    pub fn encoding(&self) -> AudioEncoding {
        self.encoding
    }

    /// Negotiated sample rate, once the device is open.
    pub fn sample_rate(&self) -> Option<u32> {
        self.negotiated.map(|(rate, _)| rate)
    }

    /// Negotiated channel count, once the device is open.
    pub fn channels(&self) -> Option<u16> {
        self.negotiated.map(|(_, channels)| channels)
    }
}

fn flush(buffer: &mut Vec<i16>, encoder: &mut dyn ChunkEncoder, out: &mpsc::UnboundedSender<Vec<u8>>) {
    if buffer.is_empty() {
        return;
    }
    match encoder.encode(buffer) {
        Ok(payload) => {
            if !payload.is_empty() && out.send(payload).is_err() {
                warn!("chunk consumer dropped, discarding audio");
            }
        }
        Err(e) => warn!(error = %e, "failed to encode audio chunk"),
    }
    buffer.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::capture::CaptureStream;
    use error_common::TranscribeError;

    /// Scripted device: hands out a pre-loaded frame channel.
    struct ScriptedDevice {
        frames: Option<mpsc::UnboundedReceiver<Vec<i16>>>,
        closed: bool,
    }

    impl ScriptedDevice {
        fn with_sender() -> (Self, mpsc::UnboundedSender<Vec<i16>>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Self {
                    frames: Some(rx),
                    closed: false,
                },
                tx,
            )
        }
    }

    impl CaptureDevice for ScriptedDevice {
        fn open(&mut self, _constraints: &CaptureConstraints) -> Result<CaptureStream> {
            let frames = self.frames.take().ok_or_else(|| {
                TranscribeError::DeviceUnavailable("device already opened".to_string())
            })?;
            Ok(CaptureStream {
                frames,
                sample_rate: 16_000,
                channels: 1,
            })
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    struct DeniedDevice;

    impl CaptureDevice for DeniedDevice {
        fn open(&mut self, _constraints: &CaptureConstraints) -> Result<CaptureStream> {
            Err(TranscribeError::DeviceUnavailable(
                "microphone permission denied".to_string(),
            ))
        }

        fn close(&mut self) {}
    }

    #[tokio::test]
    async fn emits_encoded_chunks_on_cadence() {
        let (device, frame_tx) = ScriptedDevice::with_sender();
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel();
        let mut controller = AudioSourceController::new(
            Box::new(device),
            CaptureConstraints::default(),
            128_000,
            chunk_tx,
        );
        controller.start(20).unwrap();

        frame_tx.send(vec![1, 2, 3, 4]).unwrap();
        let chunk = tokio::time::timeout(Duration::from_millis(500), chunk_rx.recv())
            .await
            .expect("cadence tick")
            .expect("chunk");
        // Linear16: two bytes per sample.
        assert_eq!(chunk.len(), 8);
        controller.stop().await;
    }

    #[tokio::test]
    async fn stop_flushes_buffered_audio_and_is_idempotent() {
        let (device, frame_tx) = ScriptedDevice::with_sender();
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel();
        let mut controller = AudioSourceController::new(
            Box::new(device),
            CaptureConstraints::default(),
            128_000,
            chunk_tx,
        );
        // Long cadence so the flush can only come from stop().
        controller.start(60_000).unwrap();
        frame_tx.send(vec![7; 10]).unwrap();
        // Let the capture task pick the frame up before stopping.
        tokio::time::sleep(Duration::from_millis(50)).await;

        controller.stop().await;
        let chunk = chunk_rx.recv().await.expect("flushed chunk");
        assert_eq!(chunk.len(), 20);

        controller.stop().await;
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn denied_device_is_device_unavailable() {
        let (chunk_tx, _chunk_rx) = mpsc::unbounded_channel();
        let mut controller = AudioSourceController::new(
            Box::new(DeniedDevice),
            CaptureConstraints::default(),
            128_000,
            chunk_tx,
        );
        let err = controller.start(250).unwrap_err();
        assert!(matches!(err, TranscribeError::DeviceUnavailable(_)));
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn negotiated_format_is_exposed_after_start() {
        let (device, _frame_tx) = ScriptedDevice::with_sender();
        let (chunk_tx, _chunk_rx) = mpsc::unbounded_channel();
        let mut controller = AudioSourceController::new(
            Box::new(device),
            CaptureConstraints::default(),
            128_000,
            chunk_tx,
        );
        assert_eq!(controller.sample_rate(), None);
        controller.start(250).unwrap();
        assert_eq!(controller.sample_rate(), Some(16_000));
        assert_eq!(controller.channels(), Some(1));
        controller.stop().await;
    }
}
