//! Stream client lifecycle tests against an in-process WebSocket server
//! standing in for the transcription service.

use std::time::Duration;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use transcription_stream_service::audio::AudioEncoding;
use transcription_stream_service::{
    AudioChunkConfig, ConnectionState, StreamConfig, TranscribeError, TranscriptionStreamClient,
};

const FINAL_TRANSCRIPT: &str = r#"{
    "type": "Results",
    "is_final": true,
    "channel": {
        "alternatives": [{
            "transcript": "Vou prescrever amoxicilina",
            "confidence": 0.95,
            "words": [{"word": "vou", "speaker": 0}]
        }]
    }
}"#;

const INTERIM_TRANSCRIPT: &str = r#"{
    "type": "Results",
    "is_final": false,
    "channel": {
        "alternatives": [{"transcript": "vou pres", "confidence": 0.41, "words": []}]
    }
}"#;

/// Route test logs through the capture-aware writer. Safe to call from
/// every test; only the first call installs the subscriber.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fast_chunk_config() -> AudioChunkConfig {
    AudioChunkConfig {
        keepalive_interval: Duration::from_millis(50),
        ..AudioChunkConfig::default()
    }
}

fn local_config(addr: std::net::SocketAddr) -> StreamConfig {
    StreamConfig {
        endpoint: format!("ws://{addr}/v1/listen"),
        api_key: Some("test-key".to_string()),
        ..StreamConfig::default()
    }
}

/// Accepts one connection, plays the scripted frames, then records every
/// text message the client sends until it asks to close.
async fn spawn_service(
    scripted_frames: Vec<String>,
) -> Result<(std::net::SocketAddr, mpsc::UnboundedReceiver<String>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        for frame in scripted_frames {
            if ws.send(Message::Text(frame)).await.is_err() {
                return;
            }
        }
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                let closing = text.contains("CloseStream");
                let _ = seen_tx.send(text);
                if closing {
                    let _ = ws.close(None).await;
                    return;
                }
            }
        }
    });

    Ok((addr, seen_rx))
}

#[tokio::test]
async fn connect_without_credentials_fails_fast() -> Result<()> {
    init_tracing();
    // Scenario: no API key configured. No socket is opened; there is not
    // even a server to refuse the connection here.
    let (mut client, _events) = TranscriptionStreamClient::new(&AudioChunkConfig::default());
    let config = StreamConfig::default();

    let err = client
        .connect(&config, AudioEncoding::Linear16, 16_000, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, TranscribeError::Configuration(_)));
    assert_eq!(client.state(), ConnectionState::Closed);
    Ok(())
}

#[tokio::test]
async fn disconnect_is_idempotent_from_any_state() -> Result<()> {
    init_tracing();
    let (mut client, _events) = TranscriptionStreamClient::new(&AudioChunkConfig::default());
    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Closed);
    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Closed);
    Ok(())
}

#[tokio::test]
async fn delivers_events_in_arrival_order() -> Result<()> {
    init_tracing();
    let (addr, _seen) = spawn_service(vec![
        INTERIM_TRANSCRIPT.to_string(),
        FINAL_TRANSCRIPT.to_string(),
    ])
    .await?;

    let (mut client, mut events) = TranscriptionStreamClient::new(&AudioChunkConfig::default());
    client
        .connect(&local_config(addr), AudioEncoding::Linear16, 16_000, 1)
        .await?;
    assert_eq!(client.state(), ConnectionState::Open);

    let first = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await?
        .expect("interim event");
    assert!(!first.is_final);
    assert_eq!(first.text, "vou pres");

    let second = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await?
        .expect("final event");
    assert!(second.is_final);
    assert_eq!(second.text, "Vou prescrever amoxicilina");
    assert_eq!(second.speaker_hint, Some(0));

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Closed);
    Ok(())
}

#[tokio::test]
async fn malformed_frames_are_dropped_without_tearing_the_stream_down() -> Result<()> {
    init_tracing();
    let (addr, _seen) = spawn_service(vec![
        "{this is not json".to_string(),
        FINAL_TRANSCRIPT.to_string(),
    ])
    .await?;

    let (mut client, mut events) = TranscriptionStreamClient::new(&AudioChunkConfig::default());
    client
        .connect(&local_config(addr), AudioEncoding::Linear16, 16_000, 1)
        .await?;

    // The malformed frame is swallowed; the next well-formed one arrives.
    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await?
        .expect("event after malformed frame");
    assert_eq!(event.text, "Vou prescrever amoxicilina");
    assert_eq!(client.state(), ConnectionState::Open);

    client.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn keepalive_flows_while_open_and_close_is_signalled() -> Result<()> {
    init_tracing();
    let (addr, mut seen) = spawn_service(vec![]).await?;

    let (mut client, _events) = TranscriptionStreamClient::new(&fast_chunk_config());
    client
        .connect(&local_config(addr), AudioEncoding::Linear16, 16_000, 1)
        .await?;

    let keepalive = tokio::time::timeout(Duration::from_secs(2), seen.recv())
        .await?
        .expect("keep-alive message");
    assert_eq!(keepalive, r#"{"type":"KeepAlive"}"#);

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Closed);

    // The clean-finish control message reaches the service.
    let mut saw_close = false;
    while let Ok(Some(text)) =
        tokio::time::timeout(Duration::from_millis(500), seen.recv()).await
    {
        if text.contains("CloseStream") {
            saw_close = true;
            break;
        }
    }
    assert!(saw_close, "service never saw the CloseStream message");

    // Second disconnect is a no-op.
    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Closed);
    Ok(())
}

#[tokio::test]
async fn audio_chunks_are_rejected_when_not_open() -> Result<()> {
    init_tracing();
    let (client, _events) = TranscriptionStreamClient::new(&AudioChunkConfig::default());
    let err = client.send_audio(vec![0u8; 4]).unwrap_err();
    assert!(matches!(err, TranscribeError::Transport(_)));
    Ok(())
}

#[tokio::test]
async fn service_close_surfaces_as_closed_state() -> Result<()> {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        let _ = ws.close(None).await;
    });

    let (mut client, _events) = TranscriptionStreamClient::new(&AudioChunkConfig::default());
    client
        .connect(&local_config(addr), AudioEncoding::Linear16, 16_000, 1)
        .await?;

    let mut state_rx = client.subscribe();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while client.state() != ConnectionState::Closed {
        tokio::time::timeout_at(deadline, state_rx.changed()).await??;
    }
    Ok(())
}
