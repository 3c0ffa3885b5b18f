//! NaCl box (Curve25519 + XSalsa20-Poly1305) from an ephemeral sender
//!
//! The holder owns a static key pair. Each payload is boxed from a fresh
//! ephemeral key pair to the holder's public key:
//!
//! ```text
//! [ ephemeral_pubkey: 32 bytes ][ nonce: 24 bytes ][ tag: 16 bytes ][ ciphertext ]
//! ```

use crypto_box::aead::Aead;
use crypto_box::{PublicKey, SalsaBox, SecretKey};

use super::keys::{random_array, ContentKeyPair, PUBLIC_KEY_SIZE, SECRET_SIZE};
use super::legacy::{POLY1305_TAG_SIZE, SALSA_NONCE_SIZE};
use super::scheme::{CryptoError, Encryptor};

/// Smallest well-formed sealed payload (empty plaintext)
pub const SEALED_OVERHEAD: usize = PUBLIC_KEY_SIZE + SALSA_NONCE_SIZE + POLY1305_TAG_SIZE;

#[derive(Debug, Clone)]
pub struct SealedBox {
    keys: ContentKeyPair,
}

impl SealedBox {
    pub fn new(keys: ContentKeyPair) -> Self {
        Self { keys }
    }

    /// Build a holder key pair from a raw 32-byte seed
    pub fn from_seed(seed: [u8; SECRET_SIZE]) -> Self {
        Self::new(ContentKeyPair::from_seed(seed))
    }

    pub fn public_key(&self) -> &PublicKey {
        self.keys.public_key()
    }
}

impl Encryptor for SealedBox {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let ephemeral = SecretKey::from(random_array::<SECRET_SIZE>()?);
        let nonce: [u8; SALSA_NONCE_SIZE] = random_array()?;

        let salsa = SalsaBox::new(self.keys.public_key(), &ephemeral);
        let ciphertext = salsa
            .encrypt(&nonce.into(), plaintext)
            .map_err(|_| anyhow::anyhow!("box encrypt error"))?;

        let mut out = Vec::with_capacity(PUBLIC_KEY_SIZE + SALSA_NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(ephemeral.public_key().as_bytes());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&self, data: &[u8]) -> Option<Vec<u8>> {
        if data.len() < SEALED_OVERHEAD {
            return None;
        }
        let (sender, rest) = data.split_at(PUBLIC_KEY_SIZE);
        let (nonce, ciphertext) = rest.split_at(SALSA_NONCE_SIZE);

        let sender: [u8; PUBLIC_KEY_SIZE] = sender.try_into().ok()?;
        let nonce: [u8; SALSA_NONCE_SIZE] = nonce.try_into().ok()?;

        let salsa = SalsaBox::new(&PublicKey::from(sender), self.keys.secret_key());
        salsa.decrypt(&nonce.into(), ciphertext).ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sealed_box_layout() {
        let holder = SealedBox::from_seed([5u8; SECRET_SIZE]);
        let sealed = holder.seal(b"hello").unwrap();
        assert_eq!(sealed.len(), SEALED_OVERHEAD + 5);
        assert_eq!(holder.open(&sealed).unwrap(), b"hello");
    }

    #[test]
    fn test_sealed_box_uses_fresh_ephemeral_keys() {
        let holder = SealedBox::from_seed([5u8; SECRET_SIZE]);
        let a = holder.seal(b"x").unwrap();
        let b = holder.seal(b"x").unwrap();
        assert_ne!(a[..PUBLIC_KEY_SIZE], b[..PUBLIC_KEY_SIZE]);
    }

    #[test]
    fn test_sealed_box_other_holder_cannot_open() {
        let alice = SealedBox::from_seed([1u8; SECRET_SIZE]);
        let bob = SealedBox::from_seed([2u8; SECRET_SIZE]);
        let sealed = alice.seal(b"for alice").unwrap();
        assert!(bob.open(&sealed).is_none());
    }
}
