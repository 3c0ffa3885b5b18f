/**
 * Relay account credentials.
 *  - Credentials file section
 *  - Secret key formats (base64url and grouped base32)
 *  - Token challenge against the relay
 */
pub mod auth;
/**
 * Cryptographic types and operations.
 *  - Hierarchical key derivation
 *  - The three AEAD schemes and per-session encryption
 *  - Session key wrapping under the content key pair
 */
pub mod crypto;
/**
 * Peer-addressed ask / notify / broadcast
 *  routed over the registered transports.
 */
pub mod mesh;
/**
 * Message envelope and the correlation table
 *  that pairs queries with their responses.
 */
pub mod message;
/**
 * Named sessions taking part in the mesh
 *  and the in-memory registry of them.
 */
pub mod peer;
/**
 * Delivery backends: in-process bus,
 *  encrypted cloud relay and the local bridge.
 */
pub mod transport;
/**
 * Helper for reporting build version information.
 */
pub mod version;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub mod prelude {
    pub use crate::auth::{AuthError, Credentials};
    pub use crate::crypto::{EncryptionManager, MasterSecret, SessionEncryption, SessionKey};
    pub use crate::mesh::{BroadcastReport, Mesh, MeshError};
    pub use crate::message::{Message, MessageType};
    pub use crate::peer::{Peer, PeerKind, PeerRegistry};
    pub use crate::transport::{
        PermissionMode, SendOptions, Transport, TransportError, TransportKind,
    };
    pub use crate::version::build_info;
}
