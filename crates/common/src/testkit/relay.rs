use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::crypto::SessionEncryption;
use crate::transport::cloud::{Packet, RelayChannel, RelayConnector, RelayEvent, RelaySender};
use crate::transport::TransportError;

/// The remote end of an in-memory relay
pub struct MemoryRelay {
    frames: flume::Receiver<Packet>,
    events: flume::Sender<RelayEvent>,
    connects: Arc<AtomicUsize>,
}

/// Hands out channels wired to a [`MemoryRelay`]
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    frames: flume::Sender<Packet>,
    events: flume::Receiver<RelayEvent>,
    connects: Arc<AtomicUsize>,
    connect_delay: Duration,
    refuse: bool,
}

impl MemoryRelay {
    pub fn new() -> (Self, MemoryConnector) {
        let (frame_tx, frame_rx) = flume::unbounded();
        let (event_tx, event_rx) = flume::unbounded();
        let connects = Arc::new(AtomicUsize::new(0));
        (
            Self {
                frames: frame_rx,
                events: event_tx,
                connects: connects.clone(),
            },
            MemoryConnector {
                frames: frame_tx,
                events: event_rx,
                connects,
                connect_delay: Duration::ZERO,
                refuse: false,
            },
        )
    }

    /// Next emitted event as `(name, data)`, skipping control frames
    pub async fn next_emit(&self) -> Option<(String, Value)> {
        while let Ok(packet) = self.frames.recv_async().await {
            if let Packet::Event { name, data, .. } = packet {
                return Some((name, data));
            }
        }
        None
    }

    /// Next frame of any kind, if one is queued
    pub fn try_next_frame(&self) -> Option<Packet> {
        self.frames.try_recv().ok()
    }

    pub fn push_event(&self, name: &str, data: Value) {
        let _ = self.events.send(RelayEvent {
            name: name.to_string(),
            data,
        });
    }

    pub fn push_update(&self, data: Value) {
        self.push_event("update", data);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl MemoryConnector {
    /// Simulate a slow handshake
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Fail every connect attempt
    pub fn refusing(mut self) -> Self {
        self.refuse = true;
        self
    }
}

#[async_trait]
impl RelayConnector for MemoryConnector {
    async fn connect(&self) -> Result<RelayChannel, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if self.refuse {
            return Err(TransportError::Connection("memory relay refused".into()));
        }
        Ok(RelayChannel {
            sender: RelaySender::new(self.frames.clone()),
            events: self.events.clone(),
        })
    }
}

/// A `new-message` update carrying `record` encrypted for `session`
pub fn encrypted_update(session: &SessionEncryption, record: &Value) -> Value {
    let ciphertext = session
        .encrypt_base64(record)
        .expect("test record encrypts");
    json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "body": {
            "t": "new-message",
            "sid": session.session_id(),
            "message": {
                "id": uuid::Uuid::new_v4().to_string(),
                "content": { "t": "encrypted", "c": ciphertext }
            }
        }
    })
}
