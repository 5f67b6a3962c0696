//! End-to-end: stream frames flow through the connection manager into the
//! alert store.

use std::sync::Arc;
use std::time::Duration;

use citypulse::connection::{ConnectionHandle, ConnectionState, StreamConfig};
use citypulse::store::{AlertStore, MemoryBackend};
use futures::SinkExt;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use crate::helpers::{alert_frame, metrics_frame, resolved_frame};

async fn spawn_push_server(frames: Vec<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();

        for frame in frames {
            socket.send(Message::Text(frame)).await.unwrap();
        }

        // Keep the connection open so the client does not enter a reconnect
        // cycle mid-test.
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    format!("ws://{addr}")
}

#[tokio::test]
async fn frames_are_applied_to_the_store_in_delivery_order() {
    let url = spawn_push_server(vec![
        alert_frame("a1"),
        "garbage that is not an envelope".to_string(),
        metrics_frame(1756462500000),
        alert_frame("a1"), // re-delivery, must not duplicate
        alert_frame("a2"),
        resolved_frame("a1"),
    ])
    .await;

    let store = Arc::new(AlertStore::open(MemoryBackend::new()).await);

    let config = StreamConfig {
        url,
        base_delay: Duration::from_millis(10),
        max_attempts: 3,
    };
    let (connection, mut messages) = ConnectionHandle::spawn(config);
    connection.connect().await.unwrap();

    let message_store = Arc::clone(&store);
    tokio::spawn(async move {
        while let Some(message) = messages.recv().await {
            message_store.apply(message).await;
        }
    });

    // Wait until the resolve of a1 has been processed.
    timeout(Duration::from_secs(5), async {
        loop {
            let active = store.active_alerts();
            if active.len() == 1 && active[0].id == "a2" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("pipeline never settled");

    // a1 was added, resolved, and never duplicated; its history entry stays.
    let recent: Vec<String> = store
        .recent_alerts()
        .iter()
        .map(|a| a.id.clone())
        .collect();
    assert_eq!(recent, vec!["a2".to_string(), "a1".to_string()]);

    // The metrics frame replaced the snapshot, the garbage frame was dropped
    // without killing the connection.
    assert_eq!(store.current_metrics().timestamp, 1756462500000);
    assert_eq!(connection.state(), ConnectionState::Connected);
}
