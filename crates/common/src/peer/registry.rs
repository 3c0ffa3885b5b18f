use std::collections::HashMap;

use parking_lot::RwLock;

use super::Peer;

/// In-memory directory of peers keyed by name
///
/// Registering an existing name replaces the previous entry. Nothing is
/// persisted; peers re-register after a restart.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<String, Peer>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `peer`, returning a snapshot of all peers
    pub fn register(&self, peer: Peer) -> Vec<Peer> {
        let mut peers = self.peers.write();
        if let Some(previous) = peers.insert(peer.name.clone(), peer) {
            tracing::debug!("replaced registration for peer {}", previous.name);
        }
        peers.values().cloned().collect()
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.peers.write().remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Peer> {
        self.peers.read().get(name).cloned()
    }

    /// Linear scan for the peer bound to `session_handle`
    pub fn get_by_session(&self, session_handle: &str) -> Option<Peer> {
        self.peers
            .read()
            .values()
            .find(|peer| peer.session_handle == session_handle)
            .cloned()
    }

    pub fn set_active(&self, name: &str, active: bool) -> bool {
        match self.peers.write().get_mut(name) {
            Some(peer) => {
                peer.active = active;
                true
            }
            None => false,
        }
    }

    pub fn list_all(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.peers.read().values().cloned().collect();
        peers.sort_by(|a, b| a.name.cmp(&b.name));
        peers
    }

    pub fn list_active(&self) -> Vec<Peer> {
        self.list_all().into_iter().filter(|p| p.active).collect()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.peers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}
