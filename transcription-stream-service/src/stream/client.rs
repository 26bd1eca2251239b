use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use error_common::{Result, TranscribeError};

use crate::audio::codec::AudioEncoding;
use crate::config::{AudioChunkConfig, StreamConfig};
use crate::stream::protocol::{self, ControlMessage};
use crate::transcription::TranscriptEvent;

/// Stream health as observed by external callers.
///
/// Owned exclusively by the stream client; transitions published through
/// the watch channel are the only way callers learn about stream health.
/// `Error` carries a human-readable cause and always collapses to `Closed`
/// after surfacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
    Error(String),
}

/// Manages the full lifecycle of one streaming session against the
/// transcription service: connect, authenticate, keep-alive, graceful and
/// abnormal close.
///
/// Inbound transcript events are pushed, in exactly the order they arrive
/// from the service, into an unbounded ordered queue. Nothing is ever
/// reordered or dropped under backpressure: loss of a final transcript is
/// user-visible data loss, so a slow consumer queues instead.
pub struct TranscriptionStreamClient {
    keepalive_interval: std::time::Duration,
    state: Arc<watch::Sender<ConnectionState>>,
    last_error: Arc<Mutex<Option<String>>>,
    events_tx: mpsc::UnboundedSender<TranscriptEvent>,
    audio_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    control_tx: Option<mpsc::UnboundedSender<ControlMessage>>,
    cancel: Arc<Notify>,
    io_task: Option<JoinHandle<()>>,
}

impl TranscriptionStreamClient {
    /// Returns the client plus the ordered transcript event queue the
    /// session consumes.
    pub fn new(
        chunk_config: &AudioChunkConfig,
    ) -> (Self, mpsc::UnboundedReceiver<TranscriptEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Closed);
        (
            Self {
                keepalive_interval: chunk_config.keepalive_interval,
                state: Arc::new(state),
                last_error: Arc::new(Mutex::new(None)),
                events_tx,
                audio_tx: None,
                control_tx: None,
                cancel: Arc::new(Notify::new()),
                io_task: None,
            },
            events_rx,
        )
    }

    /// Open the stream and send the configuration handshake.
    ///
    /// Fails fast with a configuration error when credentials are absent;
    /// no connection attempt is made in that case and the state stays
    /// `Closed`. Suspends until the service acknowledges the stream or the
    /// connect fails; a concurrent [`disconnect`](Self::disconnect) makes
    /// the attempt unwind to `Closed`.
    pub async fn connect(
        &mut self,
        config: &StreamConfig,
        encoding: AudioEncoding,
        sample_rate: u32,
        channels: u16,
    ) -> Result<()> {
        if !matches!(&*self.state.borrow(), ConnectionState::Closed) {
            warn!("connect called while the stream is not closed; ignoring");
            return Ok(());
        }

        // Credential check happens before any socket is opened.
        let request = protocol::build_request(config, encoding, sample_rate, channels)?;

        self.cancel = Arc::new(Notify::new());
        let cancel = self.cancel.clone();
        let _ = self.state.send(ConnectionState::Connecting);
        debug!(endpoint = %config.endpoint, encoding = encoding.wire_name(), "connecting");

        let ws = tokio::select! {
            connected = tokio_tungstenite::connect_async(request) => match connected {
                Ok((ws, _response)) => ws,
                Err(e) => {
                    let cause = connect_cause(&e);
                    surface_error(&self.state, &self.last_error, cause.clone());
                    return Err(TranscribeError::Transport(cause));
                }
            },
            _ = cancel.notified() => {
                debug!("connect cancelled by disconnect");
                let _ = self.state.send(ConnectionState::Closed);
                return Ok(());
            }
        };

        let (audio_tx, mut audio_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (control_tx, mut control_rx) = mpsc::unbounded_channel::<ControlMessage>();
        self.audio_tx = Some(audio_tx);
        self.control_tx = Some(control_tx);

        let _ = self.state.send(ConnectionState::Open);
        info!("transcription stream open");

        let state = self.state.clone();
        let last_error = self.last_error.clone();
        let events_tx = self.events_tx.clone();
        let keepalive_interval = self.keepalive_interval;

        self.io_task = Some(tokio::spawn(async move {
            let mut ws = ws;
            let mut keepalive = tokio::time::interval(keepalive_interval);
            keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately; the stream just opened, so
            // skip it.
            keepalive.tick().await;

            let mut audio_open = true;
            let mut control_open = true;

            loop {
                tokio::select! {
                    message = ws.next() => match message {
                        Some(Ok(Message::Text(raw))) => match protocol::decode_transcript(&raw) {
                            Ok(Some(event)) => {
                                if events_tx.send(event).is_err() {
                                    debug!("event consumer gone, closing stream");
                                    let _ = ws.close(None).await;
                                    break;
                                }
                            }
                            Ok(None) => {}
                            // Malformed message: drop it and keep going.
                            Err(e) => error_common::log_error("transcript decode", &e),
                        },
                        Some(Ok(Message::Close(_))) => {
                            debug!("service closed the stream");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            surface_error(&state, &last_error, format!("stream transport failed: {e}"));
                            break;
                        }
                        None => {
                            surface_error(&state, &last_error, "stream closed abnormally".to_string());
                            break;
                        }
                    },
                    chunk = audio_rx.recv(), if audio_open => match chunk {
                        Some(chunk) => {
                            if let Err(e) = ws.send(Message::Binary(chunk)).await {
                                surface_error(&state, &last_error, format!("audio send failed: {e}"));
                                break;
                            }
                        }
                        None => audio_open = false,
                    },
                    control = control_rx.recv(), if control_open => match control {
                        Some(message) => {
                            let closing = message == ControlMessage::CloseStream;
                            if let Err(e) = ws.send(Message::Text(message.to_json())).await {
                                surface_error(&state, &last_error, format!("control send failed: {e}"));
                                break;
                            }
                            if closing {
                                debug!("close stream requested, finishing");
                                let _ = ws.close(None).await;
                                break;
                            }
                        }
                        None => control_open = false,
                    },
                    _ = keepalive.tick() => {
                        // Suppressed whenever the stream is not open.
                        if matches!(&*state.borrow(), ConnectionState::Open) {
                            if let Err(e) = ws.send(Message::Text(ControlMessage::KeepAlive.to_json())).await {
                                surface_error(&state, &last_error, format!("keep-alive send failed: {e}"));
                                break;
                            }
                        }
                    }
                }

                if !audio_open && !control_open {
                    // Both producer handles dropped without an explicit
                    // close: finish cleanly.
                    let _ = ws.close(None).await;
                    break;
                }
            }

            let _ = state.send(ConnectionState::Closed);
        }));

        Ok(())
    }

    /// Queue one encoded audio chunk for sending.
    pub fn send_audio(&self, chunk: Vec<u8>) -> Result<()> {
        match (&self.audio_tx, &*self.state.borrow()) {
            (Some(audio_tx), ConnectionState::Open) => audio_tx
                .send(chunk)
                .map_err(|_| TranscribeError::Transport("stream task ended".to_string())),
            _ => Err(TranscribeError::Transport(
                "stream is not open".to_string(),
            )),
        }
    }

    /// Signal the service for a clean finish and release the socket.
    ///
    /// Idempotent and safe to call from any state, including concurrently
    /// with an in-flight `connect()`. The caller is expected to stop audio
    /// capture first so nothing is sent on a half-closed stream. Suspends
    /// only long enough to flush pending sends, not for a full round trip.
    pub async fn disconnect(&mut self) {
        self.cancel.notify_one();
        if let Some(control_tx) = self.control_tx.take() {
            let _ = control_tx.send(ControlMessage::CloseStream);
        }
        self.audio_tx = None;
        if let Some(io_task) = self.io_task.take() {
            let _ = io_task.await;
        }
        if !matches!(&*self.state.borrow(), ConnectionState::Closed) {
            let _ = self.state.send(ConnectionState::Closed);
        }
        debug!("transcription stream disconnected");
    }

    /// Handle for queuing audio chunks while the stream is open, if any.
    pub fn audio_sender(&self) -> Option<mpsc::UnboundedSender<Vec<u8>>> {
        self.audio_tx.clone()
    }

    /// Current state snapshot.
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Watch stream-health transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Cause of the most recent error, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}

/// Publish an error cause, then collapse to Closed.
fn surface_error(
    state: &watch::Sender<ConnectionState>,
    last_error: &Mutex<Option<String>>,
    cause: String,
) {
    warn!(cause = %cause, "stream error");
    *last_error.lock() = Some(cause.clone());
    let _ = state.send(ConnectionState::Error(cause));
    let _ = state.send(ConnectionState::Closed);
}

/// Human-readable cause for a failed connect, with auth and quota
/// rejections called out distinctly.
fn connect_cause(error: &tungstenite::Error) -> String {
    if let tungstenite::Error::Http(response) = error {
        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return format!("authentication rejected by transcription service ({status})");
        }
        if status.as_u16() == 429 {
            return format!("transcription service quota exhausted ({status})");
        }
        return format!("transcription service refused the connection ({status})");
    }
    format!("failed to reach transcription service: {error}")
}
