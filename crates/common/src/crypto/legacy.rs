//! NaCl secret box (XSalsa20-Poly1305)
//!
//! Wire format is libsodium's `crypto_secretbox_easy` with the nonce in front:
//! `nonce (24 bytes) || tag (16 bytes) || ciphertext`.

use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::XSalsa20Poly1305;

use super::keys::{random_array, SECRET_SIZE};
use super::scheme::{CryptoError, Encryptor};

/// Size of an XSalsa20 nonce in bytes
pub const SALSA_NONCE_SIZE: usize = 24;
/// Size of a Poly1305 tag in bytes
pub const POLY1305_TAG_SIZE: usize = 16;

#[derive(Clone)]
pub struct LegacySecretBox {
    key: [u8; SECRET_SIZE],
}

impl std::fmt::Debug for LegacySecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LegacySecretBox(..)")
    }
}

impl LegacySecretBox {
    pub fn new(key: [u8; SECRET_SIZE]) -> Self {
        Self { key }
    }

    fn cipher(&self) -> Result<XSalsa20Poly1305, CryptoError> {
        XSalsa20Poly1305::new_from_slice(&self.key)
            .map_err(|_| anyhow::anyhow!("invalid secret box key length").into())
    }
}

impl Encryptor for LegacySecretBox {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce: [u8; SALSA_NONCE_SIZE] = random_array()?;
        let ciphertext = self
            .cipher()?
            .encrypt(&nonce.into(), plaintext)
            .map_err(|_| anyhow::anyhow!("secret box encrypt error"))?;

        let mut out = Vec::with_capacity(SALSA_NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&self, data: &[u8]) -> Option<Vec<u8>> {
        if data.len() < SALSA_NONCE_SIZE + POLY1305_TAG_SIZE {
            return None;
        }
        let (nonce, ciphertext) = data.split_at(SALSA_NONCE_SIZE);
        let nonce: [u8; SALSA_NONCE_SIZE] = nonce.try_into().ok()?;
        self.cipher().ok()?.decrypt(&nonce.into(), ciphertext).ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_secret_box_layout() {
        let scheme = LegacySecretBox::new([9u8; SECRET_SIZE]);
        let sealed = scheme.seal(b"hello").unwrap();
        assert_eq!(sealed.len(), SALSA_NONCE_SIZE + POLY1305_TAG_SIZE + 5);
        assert_eq!(scheme.open(&sealed).unwrap(), b"hello");
    }

    #[test]
    fn test_secret_box_fresh_nonce_per_call() {
        let scheme = LegacySecretBox::new([9u8; SECRET_SIZE]);
        let a = scheme.seal(b"same").unwrap();
        let b = scheme.seal(b"same").unwrap();
        assert_ne!(a[..SALSA_NONCE_SIZE], b[..SALSA_NONCE_SIZE]);
    }

    #[test]
    fn test_secret_box_wrong_key() {
        let sealed = LegacySecretBox::new([1u8; SECRET_SIZE]).seal(b"x").unwrap();
        assert!(LegacySecretBox::new([2u8; SECRET_SIZE]).open(&sealed).is_none());
    }
}
