//! The closed set of payload encryption schemes
//!
//! Every scheme seals opaque bytes and, layered on top, JSON items. Opening
//! never fails loudly: malformed framing, a wrong version byte, an
//! authentication failure or unparseable JSON all come back as `None`.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::legacy::LegacySecretBox;
use super::sealed::SealedBox;
use super::versioned::VersionedAesGcm;

/// Errors that can occur while encrypting
///
/// Decryption has no error type, see [`Encryptor::open`].
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("crypto error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Seal and open payloads with one fixed key
pub trait Encryptor {
    /// Encrypt raw bytes into this scheme's wire framing
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt a framed payload, `None` if it does not authenticate
    fn open(&self, data: &[u8]) -> Option<Vec<u8>>;

    /// Serialize `item` as compact JSON and seal it
    fn encrypt<T: Serialize + ?Sized>(&self, item: &T) -> Result<Vec<u8>, CryptoError>
    where
        Self: Sized,
    {
        let plaintext = serde_json::to_vec(item)?;
        self.seal(&plaintext)
    }

    /// Open a payload and parse it as JSON
    fn decrypt<T: DeserializeOwned>(&self, data: &[u8]) -> Option<T>
    where
        Self: Sized,
    {
        let plaintext = self.open(data)?;
        serde_json::from_slice(&plaintext).ok()
    }
}

/// One of the three interchangeable schemes
#[derive(Debug, Clone)]
pub enum Scheme {
    /// XSalsa20-Poly1305 secret box keyed by the master secret
    Legacy(LegacySecretBox),
    /// Curve25519 box to a static key pair from an ephemeral sender
    Asymmetric(SealedBox),
    /// AES-256-GCM with a leading version byte
    Versioned(VersionedAesGcm),
}

impl Scheme {
    pub fn name(&self) -> &'static str {
        match self {
            Scheme::Legacy(_) => "legacy",
            Scheme::Asymmetric(_) => "asymmetric",
            Scheme::Versioned(_) => "versioned",
        }
    }
}

impl Encryptor for Scheme {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            Scheme::Legacy(s) => s.seal(plaintext),
            Scheme::Asymmetric(s) => s.seal(plaintext),
            Scheme::Versioned(s) => s.seal(plaintext),
        }
    }

    fn open(&self, data: &[u8]) -> Option<Vec<u8>> {
        match self {
            Scheme::Legacy(s) => s.open(data),
            Scheme::Asymmetric(s) => s.open(data),
            Scheme::Versioned(s) => s.open(data),
        }
    }
}

impl From<LegacySecretBox> for Scheme {
    fn from(s: LegacySecretBox) -> Self {
        Scheme::Legacy(s)
    }
}

impl From<SealedBox> for Scheme {
    fn from(s: SealedBox) -> Self {
        Scheme::Asymmetric(s)
    }
}

impl From<VersionedAesGcm> for Scheme {
    fn from(s: VersionedAesGcm) -> Self {
        Scheme::Versioned(s)
    }
}
