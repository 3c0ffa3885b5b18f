//! Wrapping session keys for the content key pair
//!
//! A session key travels over the network boxed to the account's content
//! public key, behind a version byte:
//!
//! ```text
//! [ version: 0x00 ][ ephemeral_pubkey: 32 ][ nonce: 24 ][ tag: 16 ][ wrapped key: 32 ]
//! ```
//!
//! Only the holder of the master secret can re-derive the content key pair
//! and unwrap it. Any other version byte, a bad length or a failed open
//! yields `None`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::keys::{ContentKeyPair, SessionKey, SECRET_SIZE};
use super::scheme::{CryptoError, Encryptor};
use super::sealed::{SealedBox, SEALED_OVERHEAD};

/// Current key wrap version
pub const KEY_WRAP_VERSION: u8 = 0x00;
/// Total size of a wrapped session key in bytes
pub const WRAPPED_KEY_SIZE: usize = 1 + SEALED_OVERHEAD + SECRET_SIZE;

#[derive(Debug, Clone)]
pub struct KeyWrap {
    sealed: SealedBox,
}

impl KeyWrap {
    pub fn new(content: ContentKeyPair) -> Self {
        Self {
            sealed: SealedBox::new(content),
        }
    }

    /// Wrap `key` to the content public key
    pub fn wrap(&self, key: &SessionKey) -> Result<Vec<u8>, CryptoError> {
        let boxed = self.sealed.seal(key.bytes())?;
        let mut out = Vec::with_capacity(1 + boxed.len());
        out.push(KEY_WRAP_VERSION);
        out.extend_from_slice(&boxed);
        Ok(out)
    }

    pub fn unwrap(&self, data: &[u8]) -> Option<SessionKey> {
        let (version, boxed) = data.split_first()?;
        if *version != KEY_WRAP_VERSION {
            return None;
        }
        let key = self.sealed.open(boxed)?;
        SessionKey::from_slice(&key).ok()
    }

    /// Unwrap the standard base64 form delivered by the session directory
    pub fn unwrap_base64(&self, encoded: &str) -> Option<SessionKey> {
        let data = STANDARD.decode(encoded.trim()).ok()?;
        self.unwrap(&data)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn wrap() -> KeyWrap {
        KeyWrap::new(ContentKeyPair::from_seed([11u8; SECRET_SIZE]))
    }

    #[test]
    fn test_key_wrap_round_trip() {
        let wrap = wrap();
        for _ in 0..8 {
            let key = SessionKey::generate();
            let wrapped = wrap.wrap(&key).unwrap();
            assert_eq!(wrapped.len(), WRAPPED_KEY_SIZE);
            assert_eq!(wrapped[0], KEY_WRAP_VERSION);
            assert_eq!(wrap.unwrap(&wrapped).unwrap(), key);

            let encoded = STANDARD.encode(&wrapped);
            assert_eq!(wrap.unwrap_base64(&encoded).unwrap(), key);
        }
    }

    #[test]
    fn test_key_wrap_rejects_other_versions() {
        let wrap = wrap();
        let mut wrapped = wrap.wrap(&SessionKey::generate()).unwrap();
        wrapped[0] = 0x01;
        assert!(wrap.unwrap(&wrapped).is_none());
    }

    #[test]
    fn test_key_wrap_rejects_wrong_key_length() {
        let wrap = wrap();
        // a correctly boxed payload that is not 32 bytes long
        let mut short = vec![KEY_WRAP_VERSION];
        short.extend(wrap.sealed.seal(&[1u8; 16]).unwrap());
        assert!(wrap.unwrap(&short).is_none());
    }

    #[test]
    fn test_key_wrap_rejects_other_recipient_and_garbage() {
        let wrapped = wrap().wrap(&SessionKey::generate()).unwrap();
        let other = KeyWrap::new(ContentKeyPair::from_seed([12u8; SECRET_SIZE]));
        assert!(other.unwrap(&wrapped).is_none());
        assert!(other.unwrap(&[]).is_none());
        assert!(other.unwrap_base64("%%% not base64").is_none());
    }
}
