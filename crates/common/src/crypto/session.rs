use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::scheme::{CryptoError, Encryptor, Scheme};

/// A scheme bound to one session id
///
/// Records go over the wire as standard base64 of the scheme's framing.
#[derive(Debug, Clone)]
pub struct SessionEncryption {
    session_id: String,
    scheme: Scheme,
}

impl SessionEncryption {
    pub fn new(session_id: impl Into<String>, scheme: Scheme) -> Self {
        Self {
            session_id: session_id.into(),
            scheme,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn encrypt<T: Serialize + ?Sized>(&self, item: &T) -> Result<Vec<u8>, CryptoError> {
        self.scheme.encrypt(item)
    }

    pub fn decrypt<T: DeserializeOwned>(&self, data: &[u8]) -> Option<T> {
        self.scheme.decrypt(data)
    }

    /// Encrypt a record and encode it for the relay
    pub fn encrypt_base64<T: Serialize + ?Sized>(&self, item: &T) -> Result<String, CryptoError> {
        Ok(STANDARD.encode(self.encrypt(item)?))
    }

    /// Decode and decrypt a relay payload
    pub fn decrypt_base64<T: DeserializeOwned>(&self, encoded: &str) -> Option<T> {
        let data = STANDARD.decode(encoded.trim()).ok()?;
        self.decrypt(&data)
    }
}
