//! Encrypted transport through the cloud relay
//!
//! Messages are encrypted client-side with the session's
//! [`SessionEncryption`] before they reach the relay, so the relay only sees
//! ciphertext. One relay connection is shared by every call; callers that
//! arrive while a connect is in flight wait for it (bounded by the connect
//! timeout) instead of opening a second one.
//!
//! The relay does not echo a correlation id through the encrypted channel.
//! An assistant reply therefore resolves the *oldest* unresolved query,
//! whichever session it was sent to.

mod directory;
pub mod frame;
pub mod record;
mod relay;

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use super::{SendOptions, Transport, TransportError, TransportKind};
use crate::crypto::{EncryptionManager, SessionEncryption};
use crate::message::Correlator;

pub use directory::{HttpSessionDirectory, SessionDirectory, SessionInfo, SessionRecord};
pub use frame::{FrameError, Packet};
pub use record::{extract_reply_text, parse_update, NewMessage, ACCEPTED_ROLES, SENT_FROM};
pub use relay::{
    updates_endpoint, RelayChannel, RelayConnector, RelayEvent, RelaySender, SocketIoConnector,
    CLIENT_TYPE, UPDATES_PATH,
};

/// Default bound on establishing (or waiting for) the relay connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// Bound on connecting, and on waiting for someone else's connect
    pub connect_timeout: Duration,
    /// Provenance tag written into records
    pub sent_from: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            sent_from: SENT_FROM.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CloudTransport {
    inner: Arc<CloudInner>,
}

#[derive(Debug)]
struct CloudInner {
    connector: Arc<dyn RelayConnector>,
    directory: Arc<dyn SessionDirectory>,
    encryption: Arc<EncryptionManager>,
    config: CloudConfig,
    connection: tokio::sync::Mutex<Option<RelaySender>>,
    sessions: RwLock<HashMap<String, SessionInfo>>,
    pending: Correlator<String>,
}

impl CloudTransport {
    pub fn new(
        connector: Arc<dyn RelayConnector>,
        directory: Arc<dyn SessionDirectory>,
        encryption: Arc<EncryptionManager>,
        config: CloudConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CloudInner {
                connector,
                directory,
                encryption,
                config,
                connection: tokio::sync::Mutex::new(None),
                sessions: RwLock::new(HashMap::new()),
                pending: Correlator::new(),
            }),
        }
    }

    pub fn encryption(&self) -> &Arc<EncryptionManager> {
        &self.inner.encryption
    }

    /// Establish the relay connection now rather than on first send
    pub async fn connect(&self) -> Result<(), TransportError> {
        self.inner.ensure_connected().await.map(|_| ())
    }

    /// Re-read the session directory, returning how many sessions it lists
    pub async fn refresh_sessions(&self) -> Result<usize, TransportError> {
        self.inner.refresh_sessions().await
    }

    /// Every session the relay lists, with decrypted metadata
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>, TransportError> {
        self.inner.refresh_sessions().await?;
        let mut sessions: Vec<SessionInfo> = self.inner.sessions.read().values().cloned().collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sessions)
    }

    /// Encryption for `session_id`, consulting the directory on a cache miss
    pub async fn session_encryption(
        &self,
        session_id: &str,
    ) -> Result<Arc<SessionEncryption>, TransportError> {
        self.inner.session_encryption(session_id).await
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    async fn prepare(
        &self,
        target_handle: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<(RelaySender, Value), TransportError> {
        let sender = self.inner.ensure_connected().await?;
        let session = self.inner.session_encryption(target_handle).await?;

        let sent_from = &self.inner.config.sent_from;
        let plain = record::user_record(text, sent_from, options.permission_mode);
        let encrypted = session.encrypt_base64(&plain)?;
        let local_id = Uuid::new_v4().to_string();
        let event = record::message_event(
            target_handle,
            &encrypted,
            &local_id,
            sent_from,
            options.permission_mode,
        );
        Ok((sender, event))
    }
}

impl CloudInner {
    async fn ensure_connected(self: &Arc<Self>) -> Result<RelaySender, TransportError> {
        if self.pending.is_closed() {
            return Err(TransportError::Shutdown);
        }
        let wait = self.config.connect_timeout;
        let mut connection = tokio::time::timeout(wait, self.connection.lock())
            .await
            .map_err(|_| {
                TransportError::Connection(format!(
                    "timed out after {:?} waiting for the relay connection",
                    wait
                ))
            })?;

        if let Some(sender) = connection.as_ref() {
            if !sender.is_closed() {
                return Ok(sender.clone());
            }
            tracing::info!("relay connection lost, reconnecting");
        }

        let channel = tokio::time::timeout(wait, self.connector.connect())
            .await
            .map_err(|_| {
                TransportError::Connection(format!("relay connect timed out after {:?}", wait))
            })??;

        tokio::spawn(run_updates(Arc::downgrade(self), channel.events));
        *connection = Some(channel.sender.clone());
        Ok(channel.sender)
    }

    async fn refresh_sessions(&self) -> Result<usize, TransportError> {
        let records = self.directory.fetch_sessions().await?;
        let count = records.len();

        for record in records {
            let key = match record.data_encryption_key.as_deref() {
                Some(wrapped) => match self.encryption.decrypt_key(wrapped) {
                    Some(key) => Some(key),
                    None => {
                        // listed, but never given an encryption to send with
                        tracing::warn!("could not unwrap the session key for {}", record.id);
                        let info = SessionInfo::new(record.id.clone(), record.active, None);
                        self.sessions.write().insert(record.id, info);
                        continue;
                    }
                },
                None => None,
            };
            let session = self.encryption.init_session(&record.id, key.as_ref());
            let metadata = record
                .metadata
                .as_deref()
                .and_then(|m| session.decrypt_base64::<Value>(m));

            let info = SessionInfo::new(record.id.clone(), record.active, metadata);
            self.sessions.write().insert(record.id, info);
        }
        Ok(count)
    }

    async fn session_encryption(
        &self,
        session_id: &str,
    ) -> Result<Arc<SessionEncryption>, TransportError> {
        if let Some(session) = self.encryption.get_session(session_id) {
            return Ok(session);
        }
        self.refresh_sessions().await?;
        self.encryption
            .get_session(session_id)
            .ok_or_else(|| TransportError::KeyUnavailable(session_id.to_string()))
    }

    async fn handle_update(&self, data: &Value) {
        let Some(update) = parse_update(data) else {
            return;
        };
        if self.pending.is_empty() {
            tracing::debug!(
                "no pending queries, ignoring message in session {}",
                update.session_id
            );
            return;
        }

        let session = match self.session_encryption(&update.session_id).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("cannot decrypt update for {}: {}", update.session_id, e);
                return;
            }
        };
        let Some(record) = session.decrypt_base64::<Value>(&update.ciphertext) else {
            tracing::warn!(
                "dropping undecryptable message {:?} in session {}",
                update.message_id,
                update.session_id
            );
            return;
        };
        let Some(text) = extract_reply_text(&record) else {
            return;
        };

        match self.pending.resolve_first(text) {
            Some(id) => tracing::debug!(
                "reply in session {} resolved query {}",
                update.session_id,
                id
            ),
            None => tracing::debug!("reply in session {} had no waiting query", update.session_id),
        }
    }
}

async fn run_updates(inner: Weak<CloudInner>, events: flume::Receiver<RelayEvent>) {
    while let Ok(event) = events.recv_async().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if event.name != "update" {
            tracing::debug!("ignoring relay event {}", event.name);
            continue;
        }
        inner.handle_update(&event.data).await;
    }
    tracing::debug!("relay update loop finished");
}

#[async_trait]
impl Transport for CloudTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Cloud
    }

    async fn send_message(
        &self,
        target_handle: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<String, TransportError> {
        let (sender, event) = self.prepare(target_handle, text, options).await?;

        // registered before the emit so an immediate reply is not lost
        let pending = self.inner.pending.register(Uuid::new_v4(), options.timeout)?;
        sender.emit("message", event).await?;
        tracing::debug!(
            "query {} sent to session {}",
            pending.id(),
            target_handle
        );
        Ok(pending.wait().await?)
    }

    async fn send_notification(
        &self,
        target_handle: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<(), TransportError> {
        let (sender, event) = self.prepare(target_handle, text, options).await?;
        sender.emit("message", event).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        let cancelled = self.inner.pending.close();
        let sender = self.inner.connection.lock().await.take();
        if let Some(sender) = sender {
            sender.disconnect().await;
        }
        tracing::info!("cloud transport closed, cancelled {} queries", cancelled);
        Ok(())
    }
}
