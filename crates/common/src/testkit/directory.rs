use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::RwLock;
use serde_json::Value;

use crate::crypto::{EncryptionManager, SessionKey};
use crate::transport::cloud::{SessionDirectory, SessionRecord};
use crate::transport::TransportError;

/// A session directory with a fixed, editable listing
#[derive(Debug, Default)]
pub struct StaticDirectory {
    records: RwLock<Vec<SessionRecord>>,
    fetches: AtomicUsize,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: SessionRecord) {
        let mut records = self.records.write();
        records.retain(|r| r.id != record.id);
        records.push(record);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionDirectory for StaticDirectory {
    async fn fetch_sessions(&self) -> Result<Vec<SessionRecord>, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.read().clone())
    }
}

/// A session record as another client of the same account would publish it
///
/// With a key, the key is wrapped to `manager`'s content key pair and the
/// metadata is encrypted with AES-GCM; without one, metadata uses the legacy
/// scheme.
pub fn session_record(
    manager: &EncryptionManager,
    id: &str,
    key: Option<&SessionKey>,
    metadata: Option<&Value>,
) -> SessionRecord {
    use crate::crypto::{Encryptor, VersionedAesGcm};

    let data_encryption_key =
        key.map(|k| STANDARD.encode(manager.encrypt_key(k).expect("key wraps")));
    let metadata = metadata.map(|m| match key {
        Some(k) => STANDARD.encode(VersionedAesGcm::new(k).encrypt(m).expect("metadata encrypts")),
        None => manager.encrypt_plain_base64(m).expect("metadata encrypts"),
    });
    SessionRecord {
        id: id.to_string(),
        data_encryption_key,
        metadata,
        active: true,
    }
}
