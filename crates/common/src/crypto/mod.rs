//! Cryptographic primitives for the relay transport
//!
//! Everything here is compatible byte-for-byte with the cloud relay's other
//! clients, which encrypt the same sessions.
//!
//! # Key Hierarchy
//!
//! One 32-byte [`MasterSecret`] per account. Every other key derives from it
//! through HMAC-SHA512 (see [`derive_key`]):
//!
//! - **Content key pair**: X25519, usage `"Happy EnCoder"`, path `["content"]`.
//!   Only used to unwrap per-session keys delivered by the network.
//! - **Session keys**: random 32-byte AES-256 keys minted by whichever client
//!   created the session, wrapped to the content public key ([`KeyWrap`]).
//!
//! # Schemes
//!
//! - [`LegacySecretBox`]: XSalsa20-Poly1305 keyed directly by the master
//!   secret. Used for sessions that never got a session key.
//! - [`SealedBox`]: Curve25519 box from a fresh ephemeral sender key.
//! - [`VersionedAesGcm`]: AES-256-GCM behind a `0x00` version byte.
//!
//! Decryption never raises. A corrupt payload must not be able to take down
//! the update loop, so every open path returns `Option`.

mod derive;
mod key_wrap;
mod keys;
mod legacy;
mod manager;
mod scheme;
mod sealed;
mod session;
mod versioned;

pub use derive::{derive_key, DERIVED_KEY_SIZE};
pub use key_wrap::{KeyWrap, KEY_WRAP_VERSION, WRAPPED_KEY_SIZE};
pub use keys::{
    ContentKeyPair, KeyError, MasterSecret, SessionKey, CONTENT_KEY_PATH, CONTENT_KEY_USAGE,
    PUBLIC_KEY_SIZE, SECRET_SIZE,
};
pub use legacy::{LegacySecretBox, POLY1305_TAG_SIZE, SALSA_NONCE_SIZE};
pub use manager::EncryptionManager;
pub use scheme::{CryptoError, Encryptor, Scheme};
pub use sealed::{SealedBox, SEALED_OVERHEAD};
pub use session::SessionEncryption;
pub use versioned::{VersionedAesGcm, AES_GCM_IV_SIZE, AES_GCM_TAG_SIZE, AES_GCM_VERSION};
