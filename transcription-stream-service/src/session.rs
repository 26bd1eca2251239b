use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};
use uuid::Uuid;

use error_common::Result;

use crate::audio::capture::{CaptureConstraints, CaptureDevice};
use crate::audio::controller::AudioSourceController;
use crate::config::{AudioChunkConfig, StreamConfig};
use crate::latency::{LatencyMonitor, LatencyStats};
use crate::network::{NetworkCondition, NetworkQualityEstimator};
use crate::speaker::SpeakerRoleInferenceEngine;
use crate::stream::client::{ConnectionState, TranscriptionStreamClient};
use crate::transcription::{
    SessionStatus, SessionSummary, SpeakerRole, SpeakerStats, TranscriptEvent, TranscriptUpdate,
};

/// Callback across the consumer boundary, invoked once per processed
/// transcript event.
pub type TranscriptCallback = Arc<dyn Fn(TranscriptUpdate) + Send + Sync>;

/// State mutated only from the serialized event path; snapshot reads may
/// come from any thread through the read side of the locks.
struct SessionShared {
    engine: RwLock<SpeakerRoleInferenceEngine>,
    latency: RwLock<LatencyMonitor>,
    estimator: RwLock<NetworkQualityEstimator>,
}

/// One consultation's transcription session.
///
/// Owns all five components and the single ordered event path that
/// serializes device and network entry into shared state: transcript
/// events are consumed by one task, in arrival order, which feeds the
/// latency monitor first and the inference engine second. Constructed per
/// consultation and torn down via [`reset`](Self::reset) or drop; there
/// are no process-wide singletons.
pub struct ConsultationSession {
    id: Uuid,
    created_at: DateTime<Utc>,
    stream_config: StreamConfig,
    chunk_config: AudioChunkConfig,
    client: TranscriptionStreamClient,
    audio: Arc<tokio::sync::Mutex<AudioSourceController>>,
    shared: Arc<SessionShared>,
    audio_out: Arc<Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>>,
    events_rx: Option<mpsc::UnboundedReceiver<TranscriptEvent>>,
    chunk_rx: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    consumer: Option<TranscriptCallback>,
    event_task: Option<JoinHandle<()>>,
    forward_task: Option<JoinHandle<()>>,
    adapt_task: Option<JoinHandle<()>>,
}

impl ConsultationSession {
    pub fn new(
        stream_config: StreamConfig,
        chunk_config: AudioChunkConfig,
        device: Box<dyn CaptureDevice>,
    ) -> Self {
        let (client, events_rx) = TranscriptionStreamClient::new(&chunk_config);
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let audio = AudioSourceController::new(
            device,
            CaptureConstraints::default(),
            chunk_config.target_bitrate,
            chunk_tx,
        );
        let shared = Arc::new(SessionShared {
            engine: RwLock::new(SpeakerRoleInferenceEngine::new()),
            latency: RwLock::new(LatencyMonitor::new()),
            estimator: RwLock::new(NetworkQualityEstimator::new(chunk_config.clone())),
        });
        let id = Uuid::new_v4();
        info!(session_id = %id, "consultation session created");
        Self {
            id,
            created_at: Utc::now(),
            stream_config,
            chunk_config,
            client,
            audio: Arc::new(tokio::sync::Mutex::new(audio)),
            shared,
            audio_out: Arc::new(Mutex::new(None)),
            events_rx: Some(events_rx),
            chunk_rx: Some(chunk_rx),
            consumer: None,
            event_task: None,
            forward_task: None,
            adapt_task: None,
        }
    }

    /// Register the consumer-boundary callback. Must be set before
    /// `connect` to observe every event.
    pub fn on_transcript(&mut self, callback: TranscriptCallback) {
        self.consumer = Some(callback);
    }

    /// Start capture, open the stream, and begin processing events.
    pub async fn connect(&mut self) -> Result<()> {
        if !matches!(self.client.state(), ConnectionState::Closed) {
            return Ok(());
        }

        let (encoding, sample_rate, channels) = {
            let mut audio = self.audio.lock().await;
            let chunk_ms = self.shared.estimator.read().current_chunk_size_ms();
            audio.start(chunk_ms)?;
            (
                audio.encoding(),
                audio.sample_rate().unwrap_or(16_000),
                audio.channels().unwrap_or(1),
            )
        };

        if let Err(e) = self
            .client
            .connect(&self.stream_config, encoding, sample_rate, channels)
            .await
        {
            // Don't leave the microphone held on a dead session.
            self.audio.lock().await.stop().await;
            return Err(e);
        }

        *self.audio_out.lock() = self.client.audio_sender();
        self.spawn_event_loop();
        self.spawn_chunk_forwarder();
        self.spawn_network_adaptation();
        info!(session_id = %self.id, "consultation session connected");
        Ok(())
    }

    /// Stop audio capture first, then close the stream cleanly. Idempotent.
    pub async fn disconnect(&mut self) {
        self.audio.lock().await.stop().await;
        *self.audio_out.lock() = None;
        self.client.disconnect().await;
        debug!(session_id = %self.id, "consultation session disconnected");
    }

    /// Tear the session state down: disconnect, then clear the segment
    /// log, speaker table, counters, latency window, and network tier.
    pub async fn reset(&mut self) {
        self.disconnect().await;
        self.shared.engine.write().reset();
        self.shared.latency.write().reset();
        self.shared.estimator.write().reset();
        info!(session_id = %self.id, "consultation session reset");
    }

    /// Manual speaker-role override; wins over heuristics from here on.
    pub fn set_speaker_role(&self, speaker_id: u64, role: SpeakerRole, name: Option<String>) {
        self.shared.engine.write().set_speaker_role(speaker_id, role, name);
    }

    /// Render the finalized transcript plus any trailing interim line.
    pub fn formatted_transcript(&self) -> String {
        self.shared.engine.read().formatted_transcript()
    }

    pub fn speaker_stats(&self) -> Vec<SpeakerStats> {
        self.shared.engine.read().speaker_stats()
    }

    pub fn latency_stats(&self) -> Option<LatencyStats> {
        self.shared.latency.read().stats()
    }

    pub fn network_condition(&self) -> NetworkCondition {
        self.shared.estimator.read().condition()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.client.state()
    }

    /// Watch stream-health transitions, e.g. for a status indicator.
    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.client.subscribe()
    }

    pub fn last_error(&self) -> Option<String> {
        self.client.last_error()
    }

    pub fn summary(&self) -> SessionSummary {
        let engine = self.shared.engine.read();
        let status = match self.client.state() {
            ConnectionState::Connecting | ConnectionState::Open => SessionStatus::Active,
            ConnectionState::Error(_) => SessionStatus::Error,
            ConnectionState::Closed if !engine.segments().is_empty() => SessionStatus::Completed,
            ConnectionState::Closed => SessionStatus::Idle,
        };
        SessionSummary {
            id: self.id,
            status,
            created_at: self.created_at,
            updated_at: Utc::now(),
            segment_count: engine.segments().len(),
            speaker_count: engine.speakers().len(),
        }
    }

    /// The serialized event path: one consumer, arrival order, latency
    /// before inference.
    fn spawn_event_loop(&mut self) {
        let mut events_rx = match self.events_rx.take() {
            Some(events_rx) => events_rx,
            None => return, // already running
        };
        let shared = self.shared.clone();
        let consumer = self.consumer.clone();
        self.event_task = Some(tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                let speaker_id = process_event(&shared, &event);
                if let Some(callback) = &consumer {
                    if !event.text.trim().is_empty() {
                        callback(TranscriptUpdate {
                            text: event.text,
                            is_final: event.is_final,
                            speaker_id,
                            confidence: event.confidence,
                        });
                    }
                }
            }
        }));
    }

    /// Forward encoded chunks to whatever stream is currently open;
    /// chunks produced while no stream is open are dropped.
    fn spawn_chunk_forwarder(&mut self) {
        let mut chunk_rx = match self.chunk_rx.take() {
            Some(chunk_rx) => chunk_rx,
            None => return,
        };
        let audio_out = self.audio_out.clone();
        self.forward_task = Some(tokio::spawn(async move {
            while let Some(chunk) = chunk_rx.recv().await {
                let sender = audio_out.lock().clone();
                match sender {
                    Some(sender) => {
                        if sender.send(chunk).is_err() {
                            trace!("stream task gone, dropping audio chunk");
                        }
                    }
                    None => trace!("no open stream, dropping audio chunk"),
                }
            }
        }));
    }

    /// React to network-condition transitions by hot-swapping the chunk
    /// cadence.
    fn spawn_network_adaptation(&mut self) {
        if self.adapt_task.is_some() {
            return;
        }
        let mut condition_rx = self.shared.estimator.read().subscribe();
        let chunk_config = self.chunk_config.clone();
        let audio = self.audio.clone();
        self.adapt_task = Some(tokio::spawn(async move {
            while condition_rx.changed().await.is_ok() {
                let condition = *condition_rx.borrow_and_update();
                let chunk_ms = match condition {
                    NetworkCondition::FourG => chunk_config.stable_ms,
                    NetworkCondition::ThreeG => chunk_config.moderate_ms,
                    NetworkCondition::TwoG | NetworkCondition::Slow2g => chunk_config.poor_ms,
                    NetworkCondition::Unknown => chunk_config.default_ms,
                };
                let mut audio = audio.lock().await;
                if audio.is_running() {
                    if let Err(e) = audio.set_chunk_duration(chunk_ms).await {
                        error_common::log_error("chunk cadence adaptation", &e);
                    }
                }
            }
        }));
    }
}

impl Drop for ConsultationSession {
    fn drop(&mut self) {
        let tasks = [
            self.event_task.take(),
            self.forward_task.take(),
            self.adapt_task.take(),
        ];
        for task in tasks.into_iter().flatten() {
            task.abort();
        }
    }
}

/// Feed one event through the monitor and the engine, in that order.
/// Returns the speaker id the event was attributed to, if any.
fn process_event(shared: &SessionShared, event: &TranscriptEvent) -> Option<u64> {
    if event.is_final && !event.text.trim().is_empty() {
        let mut latency = shared.latency.write();
        latency.record(event.received_at.timestamp_millis() as u64);
        if let Some(stats) = latency.stats() {
            let condition = NetworkQualityEstimator::condition_from_latency(&stats);
            shared.estimator.write().observe(condition);
        }
    }

    let mut engine = shared.engine.write();
    let appended = engine.process_transcription(
        &event.text,
        event.speaker_hint,
        event.is_final,
        event.confidence,
    );
    appended
        .map(|segment| segment.speaker.id)
        .or_else(|| engine.current_speaker_id())
}
