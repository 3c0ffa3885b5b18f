//! Versioned AES-256-GCM
//!
//! ```text
//! [ version: 1 byte = 0x00 ][ iv: 12 bytes ][ ciphertext ][ tag: 16 bytes ]
//! ```
//!
//! The version byte is checked on every open; anything other than
//! [`AES_GCM_VERSION`] is rejected before the cipher runs.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};

use super::keys::{random_array, SessionKey, SECRET_SIZE};
use super::scheme::{CryptoError, Encryptor};

/// Current frame version
pub const AES_GCM_VERSION: u8 = 0x00;
/// Size of the AES-GCM IV in bytes
pub const AES_GCM_IV_SIZE: usize = 12;
/// Size of the AES-GCM tag in bytes
pub const AES_GCM_TAG_SIZE: usize = 16;

#[derive(Clone)]
pub struct VersionedAesGcm {
    key: [u8; SECRET_SIZE],
}

impl std::fmt::Debug for VersionedAesGcm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VersionedAesGcm(..)")
    }
}

impl VersionedAesGcm {
    pub fn new(key: &SessionKey) -> Self {
        Self { key: **key }
    }

    fn cipher(&self) -> Result<Aes256Gcm, CryptoError> {
        Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| anyhow::anyhow!("invalid AES-256 key length").into())
    }

    pub(crate) fn seal_with_iv(
        &self,
        iv: &[u8; AES_GCM_IV_SIZE],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let ciphertext = self
            .cipher()?
            .encrypt(Nonce::from_slice(iv), plaintext)
            .map_err(|_| anyhow::anyhow!("aes-gcm encrypt error"))?;

        let mut out = Vec::with_capacity(1 + AES_GCM_IV_SIZE + ciphertext.len());
        out.push(AES_GCM_VERSION);
        out.extend_from_slice(iv);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }
}

impl Encryptor for VersionedAesGcm {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let iv: [u8; AES_GCM_IV_SIZE] = random_array()?;
        self.seal_with_iv(&iv, plaintext)
    }

    fn open(&self, data: &[u8]) -> Option<Vec<u8>> {
        let (version, rest) = data.split_first()?;
        if *version != AES_GCM_VERSION || rest.len() < AES_GCM_IV_SIZE + AES_GCM_TAG_SIZE {
            return None;
        }
        let (iv, ciphertext) = rest.split_at(AES_GCM_IV_SIZE);
        self.cipher()
            .ok()?
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .ok()
    }
}
