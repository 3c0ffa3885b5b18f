//! Peers participating in the mesh and the registry that tracks them

mod registry;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub use registry::PeerRegistry;

/// How a peer is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerKind {
    /// A session on this machine, driven through a local transport
    Local,
    /// A session hosted behind the encrypted cloud relay
    Cloud,
}

impl std::fmt::Display for PeerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerKind::Local => f.write_str("local"),
            PeerKind::Cloud => f.write_str("cloud"),
        }
    }
}

/// A named coding-agent session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Unique key in the registry
    pub name: String,
    pub kind: PeerKind,
    /// Transport-specific address: a pane target for local peers,
    ///  a relay session id for cloud peers
    pub session_handle: String,
    /// Working directory of the session
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Peer {
    pub fn new(name: impl Into<String>, kind: PeerKind, session_handle: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            session_handle: session_handle.into(),
            path: String::new(),
            capabilities: BTreeSet::new(),
            active: true,
        }
    }

    pub fn local(name: impl Into<String>, session_handle: impl Into<String>) -> Self {
        Self::new(name, PeerKind::Local, session_handle)
    }

    pub fn cloud(name: impl Into<String>, session_handle: impl Into<String>) -> Self {
        Self::new(name, PeerKind::Cloud, session_handle)
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_peer_serde_shape() {
        let peer = Peer::cloud("backend", "sess-1")
            .with_path("/src/backend")
            .with_capability("rust");
        let value = serde_json::to_value(&peer).unwrap();
        assert_eq!(value["kind"], "cloud");
        assert_eq!(value["session_handle"], "sess-1");
        assert_eq!(value["capabilities"], serde_json::json!(["rust"]));

        let parsed: Peer =
            serde_json::from_str(r#"{"name":"a","kind":"local","session_handle":"0:1"}"#).unwrap();
        assert!(parsed.active);
        assert!(parsed.capabilities.is_empty());
        assert_eq!(parsed.kind, PeerKind::Local);
    }
}
