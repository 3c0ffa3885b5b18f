use std::fmt;
use std::ops::Deref;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;

use super::derive::derive_key;

/// Size of the master secret and of every symmetric key in bytes
pub const SECRET_SIZE: usize = 32;
/// Size of an X25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Usage label for the content key pair
pub const CONTENT_KEY_USAGE: &str = "Happy EnCoder";
/// Derivation path for the content key pair
pub const CONTENT_KEY_PATH: [&str; 1] = ["content"];

/// Errors that can occur while parsing key material
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub(crate) fn fixed_from_slice(data: &[u8], what: &str) -> Result<[u8; SECRET_SIZE], KeyError> {
    if data.len() != SECRET_SIZE {
        return Err(anyhow::anyhow!(
            "invalid {} size, expected {}, got {}",
            what,
            SECRET_SIZE,
            data.len()
        )
        .into());
    }
    let mut buff = [0; SECRET_SIZE];
    buff.copy_from_slice(data);
    Ok(buff)
}

pub(crate) fn random_array<const N: usize>() -> Result<[u8; N], anyhow::Error> {
    let mut buff = [0u8; N];
    getrandom::getrandom(&mut buff)
        .map_err(|e| anyhow::anyhow!("failed to generate random bytes: {}", e))?;
    Ok(buff)
}

/// Root key material for one account
///
/// Every other key is a deterministic function of this secret. It is held in
/// memory for the life of the process and never written out in derived form.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterSecret([u8; SECRET_SIZE]);

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret(..)")
    }
}

impl Deref for MasterSecret {
    type Target = [u8; SECRET_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; SECRET_SIZE]> for MasterSecret {
    fn from(bytes: [u8; SECRET_SIZE]) -> Self {
        MasterSecret(bytes)
    }
}

impl MasterSecret {
    /// Generate a new random master secret
    pub fn generate() -> Self {
        let mut buff = [0; SECRET_SIZE];
        getrandom::getrandom(&mut buff).expect("failed to generate random bytes");
        Self(buff)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, KeyError> {
        Ok(Self(fixed_from_slice(data, "master secret")?))
    }

    /// Parse the URL-safe base64 form used in credential files
    ///
    /// Padding is optional.
    pub fn from_base64url(encoded: &str) -> Result<Self, KeyError> {
        let trimmed = encoded.trim().trim_end_matches('=');
        let bytes = URL_SAFE_NO_PAD.decode(trimmed)?;
        Self::from_slice(&bytes)
    }

    /// URL-safe base64 without padding
    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Derive a child key, see [`derive_key`]
    pub fn derive<S: AsRef<str>>(&self, usage: &str, path: &[S]) -> [u8; SECRET_SIZE] {
        derive_key(&self.0, usage, path)
    }
}

/// A per-session symmetric key for the versioned AES-256-GCM scheme
///
/// Session keys are minted by whichever client created the session and are
/// delivered wrapped under the content key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; SECRET_SIZE]);

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

impl Deref for SessionKey {
    type Target = [u8; SECRET_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; SECRET_SIZE]> for SessionKey {
    fn from(bytes: [u8; SECRET_SIZE]) -> Self {
        SessionKey(bytes)
    }
}

impl SessionKey {
    pub fn generate() -> Self {
        let mut buff = [0; SECRET_SIZE];
        getrandom::getrandom(&mut buff).expect("failed to generate random bytes");
        Self(buff)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, KeyError> {
        Ok(Self(fixed_from_slice(data, "session key")?))
    }

    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }
}

/// The X25519 key pair that unwraps network-delivered session keys
///
/// Derived once from the master secret with usage [`CONTENT_KEY_USAGE`] and
/// path [`CONTENT_KEY_PATH`]. The derived 32 bytes are used directly as the
/// X25519 secret scalar.
#[derive(Clone)]
pub struct ContentKeyPair {
    secret: crypto_box::SecretKey,
    public: crypto_box::PublicKey,
}

impl fmt::Debug for ContentKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentKeyPair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}

impl ContentKeyPair {
    pub fn from_master(master: &MasterSecret) -> Self {
        Self::from_seed(master.derive(CONTENT_KEY_USAGE, &CONTENT_KEY_PATH))
    }

    pub fn from_seed(seed: [u8; SECRET_SIZE]) -> Self {
        let secret = crypto_box::SecretKey::from(seed);
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn public_key(&self) -> &crypto_box::PublicKey {
        &self.public
    }

    /// Standard base64 of the public key, as published to the relay
    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.public.as_bytes())
    }

    pub(crate) fn secret_key(&self) -> &crypto_box::SecretKey {
        &self.secret
    }
}
