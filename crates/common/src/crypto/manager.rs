use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::key_wrap::KeyWrap;
use super::keys::{ContentKeyPair, MasterSecret, SessionKey};
use super::legacy::LegacySecretBox;
use super::scheme::{CryptoError, Encryptor, Scheme};
use super::session::SessionEncryption;
use super::versioned::VersionedAesGcm;

/// Owns the master secret and every session's encryption
///
/// Sessions are created lazily on first use and cached for the life of the
/// manager. A session with a delivered key uses [`VersionedAesGcm`]; one
/// without falls back to [`LegacySecretBox`] keyed by the master secret.
pub struct EncryptionManager {
    master: MasterSecret,
    content: ContentKeyPair,
    key_wrap: KeyWrap,
    legacy: LegacySecretBox,
    sessions: RwLock<HashMap<String, Arc<SessionEncryption>>>,
}

impl std::fmt::Debug for EncryptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionManager")
            .field("content", &self.content)
            .field("sessions", &self.sessions.read().len())
            .finish_non_exhaustive()
    }
}

impl EncryptionManager {
    pub fn new(master: MasterSecret) -> Self {
        let content = ContentKeyPair::from_master(&master);
        let key_wrap = KeyWrap::new(content.clone());
        let legacy = LegacySecretBox::new(*master);
        Self {
            master,
            content,
            key_wrap,
            legacy,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn master(&self) -> &MasterSecret {
        &self.master
    }

    pub fn content_keys(&self) -> &ContentKeyPair {
        &self.content
    }

    /// Wrap a session key to this account's content public key
    pub fn encrypt_key(&self, key: &SessionKey) -> Result<Vec<u8>, CryptoError> {
        self.key_wrap.wrap(key)
    }

    /// Unwrap a base64 session key, `None` if it is not ours or malformed
    pub fn decrypt_key(&self, encrypted: &str) -> Option<SessionKey> {
        self.key_wrap.unwrap_base64(encrypted)
    }

    /// Create (or fetch the cached) encryption for `session_id`
    ///
    /// Idempotent per session id: once a session is cached a later call with
    /// a different key returns the cached instance unchanged.
    pub fn init_session(&self, session_id: &str, key: Option<&SessionKey>) -> Arc<SessionEncryption> {
        if let Some(existing) = self.sessions.read().get(session_id) {
            return existing.clone();
        }

        let mut sessions = self.sessions.write();
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                let scheme: Scheme = match key {
                    Some(key) => VersionedAesGcm::new(key).into(),
                    None => self.legacy.clone().into(),
                };
                tracing::debug!(
                    "initialized {} encryption for session {}",
                    scheme.name(),
                    session_id
                );
                Arc::new(SessionEncryption::new(session_id, scheme))
            })
            .clone()
    }

    /// Cache lookup only
    pub fn get_session(&self, session_id: &str) -> Option<Arc<SessionEncryption>> {
        self.sessions.read().get(session_id).cloned()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Encrypt with the legacy scheme, independent of any session
    pub fn encrypt_plain<T: Serialize + ?Sized>(&self, item: &T) -> Result<Vec<u8>, CryptoError> {
        self.legacy.encrypt(item)
    }

    pub fn decrypt_plain<T: DeserializeOwned>(&self, data: &[u8]) -> Option<T> {
        self.legacy.decrypt(data)
    }

    pub fn encrypt_plain_base64<T: Serialize + ?Sized>(
        &self,
        item: &T,
    ) -> Result<String, CryptoError> {
        Ok(STANDARD.encode(self.encrypt_plain(item)?))
    }

    pub fn decrypt_plain_base64<T: DeserializeOwned>(&self, encoded: &str) -> Option<T> {
        let data = STANDARD.decode(encoded.trim()).ok()?;
        self.decrypt_plain(&data)
    }
}
