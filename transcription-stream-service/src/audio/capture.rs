use tokio::sync::mpsc;

use error_common::Result;

/// Capability requests for the capture device.
///
/// These are requests, not guarantees: the platform may negotiate a
/// different sample rate or channel count, and the DSP flags (echo
/// cancellation, noise suppression, auto-gain) are forwarded to backends
/// that support them and silently ignored elsewhere.
#[derive(Debug, Clone)]
pub struct CaptureConstraints {
    pub sample_rate: u32,
    pub channels: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain: true,
        }
    }
}

/// An open capture stream: PCM frames plus the negotiated format.
///
/// Frames arrive on the device's own callback cadence; chunking to the
/// outgoing cadence is the controller's job.
pub struct CaptureStream {
    pub frames: mpsc::UnboundedReceiver<Vec<i16>>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// The audio device boundary.
///
/// The session owns exactly one device for its lifetime; `open` acquires
/// exclusive access and `close` releases it. `close` is idempotent.
pub trait CaptureDevice: Send {
    /// Acquire the device and start delivering PCM frames.
    ///
    /// Fails with [`error_common::TranscribeError::DeviceUnavailable`] when
    /// permission is denied or no input device exists.
    fn open(&mut self, constraints: &CaptureConstraints) -> Result<CaptureStream>;

    /// Release the device. Idempotent.
    fn close(&mut self);
}

#[cfg(feature = "microphone")]
mod system {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use tokio::sync::mpsc;
    use tracing::{debug, warn};

    use error_common::{Result, TranscribeError};

    use super::{CaptureConstraints, CaptureDevice, CaptureStream};

    enum DeviceCommand {
        Stop,
    }

    /// System microphone behind cpal.
    ///
    /// cpal streams are not `Send`, so the stream lives on a dedicated
    /// thread that parks until `close` signals it.
    #[derive(Default)]
    pub struct SystemCaptureDevice {
        stop_tx: Option<std::sync::mpsc::Sender<DeviceCommand>>,
    }

    impl SystemCaptureDevice {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl CaptureDevice for SystemCaptureDevice {
        fn open(&mut self, constraints: &CaptureConstraints) -> Result<CaptureStream> {
            let (frame_tx, frame_rx) = mpsc::unbounded_channel();
            let (stop_tx, stop_rx) = std::sync::mpsc::channel();
            let (ready_tx, ready_rx) = std::sync::mpsc::channel();

            if constraints.echo_cancellation || constraints.noise_suppression {
                // cpal exposes no DSP toggles; the platform default applies.
                debug!("capture DSP flags requested; delegated to the platform device");
            }

            std::thread::spawn(move || {
                let host = cpal::default_host();
                let device = match host.default_input_device() {
                    Some(device) => device,
                    None => {
                        let _ = ready_tx.send(Err(TranscribeError::DeviceUnavailable(
                            "no input device available".to_string(),
                        )));
                        return;
                    }
                };
                let config = match device.default_input_config() {
                    Ok(config) => config,
                    Err(e) => {
                        let _ = ready_tx.send(Err(TranscribeError::DeviceUnavailable(
                            format!("input device rejected capture: {e}"),
                        )));
                        return;
                    }
                };
                let sample_rate = config.sample_rate().0;
                let channels = config.channels();

                let stream = device.build_input_stream(
                    &config.into(),
                    move |data: &[f32], _| {
                        let frame: Vec<i16> = data
                            .iter()
                            .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                            .collect();
                        let _ = frame_tx.send(frame);
                    },
                    |e| warn!(error = %e, "capture stream error"),
                    None,
                );
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(TranscribeError::DeviceUnavailable(
                            format!("failed to open capture stream: {e}"),
                        )));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(TranscribeError::DeviceUnavailable(format!(
                        "failed to start capture stream: {e}"
                    ))));
                    return;
                }
                let _ = ready_tx.send(Ok((sample_rate, channels)));

                // Keep the stream alive until stop.
                let _ = stop_rx.recv();
                drop(stream);
            });

            let (sample_rate, channels) = ready_rx
                .recv()
                .map_err(|_| {
                    TranscribeError::DeviceUnavailable("capture thread exited".to_string())
                })??;

            self.stop_tx = Some(stop_tx);
            debug!(sample_rate, channels, "system capture device opened");
            Ok(CaptureStream {
                frames: frame_rx,
                sample_rate,
                channels,
            })
        }

        fn close(&mut self) {
            if let Some(stop_tx) = self.stop_tx.take() {
                let _ = stop_tx.send(DeviceCommand::Stop);
            }
        }
    }
}

#[cfg(feature = "microphone")]
pub use system::SystemCaptureDevice;
