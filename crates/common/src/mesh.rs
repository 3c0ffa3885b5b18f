//! Peer-to-peer coordination over the registered transports
//!
//! Every outbound call goes through the same steps: resolve the target in the
//! [`PeerRegistry`], reject unknown targets (and, for queries, the caller
//! itself), pick the transport for the peer's kind, dispatch under a timeout,
//! and map whatever the transport reported into a [`MeshError`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use crate::peer::{Peer, PeerKind, PeerRegistry};
use crate::transport::{
    BridgeRequest, BridgeResponse, RequestHandler, SendOptions, Transport, TransportError,
};

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("unknown peer: {0}")]
    UnknownPeer(String),
    #[error("peer {0} cannot query itself")]
    SelfQueryRejected(String),
    #[error("no response from {peer} within {after:?}")]
    Timeout { peer: String, after: Duration },
    #[error("no transport registered for {0} peers")]
    NoTransport(PeerKind),
    #[error("encryption unavailable for {peer} (session {session})")]
    EncryptionUnavailable { peer: String, session: String },
    #[error("transport error talking to {peer}: {source}")]
    Transport {
        peer: String,
        #[source]
        source: TransportError,
    },
}

impl MeshError {
    fn from_transport(peer: &Peer, err: TransportError) -> Self {
        match err {
            TransportError::Timeout(after) => MeshError::Timeout {
                peer: peer.name.clone(),
                after,
            },
            TransportError::KeyUnavailable(session) => MeshError::EncryptionUnavailable {
                peer: peer.name.clone(),
                session,
            },
            source => MeshError::Transport {
                peer: peer.name.clone(),
                source,
            },
        }
    }
}

/// Per-peer outcome of a broadcast, keyed by peer name
#[derive(Debug, Default)]
pub struct BroadcastReport {
    pub results: BTreeMap<String, Result<(), MeshError>>,
}

impl BroadcastReport {
    pub fn succeeded(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, r)| r.is_ok())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn failed(&self) -> Vec<(&str, &MeshError)> {
        self.results
            .iter()
            .filter_map(|(name, r)| r.as_ref().err().map(|e| (name.as_str(), e)))
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.values().all(Result::is_ok)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

pub fn format_query(from: &str, text: &str) -> String {
    format!("@{} asks: {}", from, text)
}

pub fn format_notification(from: &str, text: &str) -> String {
    format!("@{} says: {}", from, text)
}

pub fn format_broadcast(from: &str, text: &str) -> String {
    format!("[BROADCAST from {}]: {}", from, text)
}

/// Routes peer-addressed calls to the transport for each peer kind
#[derive(Debug, Clone)]
pub struct Mesh {
    registry: Arc<PeerRegistry>,
    transports: HashMap<PeerKind, Arc<dyn Transport>>,
    defaults: SendOptions,
}

impl Mesh {
    pub fn new(registry: Arc<PeerRegistry>) -> Self {
        Self {
            registry,
            transports: HashMap::new(),
            defaults: SendOptions::default(),
        }
    }

    pub fn with_transport(mut self, kind: PeerKind, transport: Arc<dyn Transport>) -> Self {
        self.transports.insert(kind, transport);
        self
    }

    pub fn with_default_options(mut self, options: SendOptions) -> Self {
        self.defaults = options;
        self
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    pub fn default_options(&self) -> &SendOptions {
        &self.defaults
    }

    fn resolve(&self, name: &str) -> Result<(Peer, Arc<dyn Transport>), MeshError> {
        let peer = self
            .registry
            .get(name)
            .ok_or_else(|| MeshError::UnknownPeer(name.to_string()))?;
        let transport = self
            .transports
            .get(&peer.kind)
            .cloned()
            .ok_or(MeshError::NoTransport(peer.kind))?;
        Ok((peer, transport))
    }

    /// Ask `to` a question on behalf of `from` and wait for the answer
    pub async fn ask_peer(&self, from: &str, to: &str, text: &str) -> Result<String, MeshError> {
        self.ask_peer_with(from, to, text, &self.defaults).await
    }

    pub async fn ask_peer_with(
        &self,
        from: &str,
        to: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<String, MeshError> {
        let (peer, transport) = self.resolve(to)?;
        if from == peer.name {
            return Err(MeshError::SelfQueryRejected(peer.name));
        }
        if !peer.active {
            tracing::debug!("querying inactive peer {}", peer.name);
        }

        let options = options.clone().with_source(from);
        let formatted = format_query(from, text);
        tracing::debug!(
            "asking {} via {:?} (timeout {:?})",
            peer.name,
            transport.kind(),
            options.timeout
        );

        let call = transport.send_message(&peer.session_handle, &formatted, &options);
        match tokio::time::timeout(options.timeout, call).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(err)) => Err(MeshError::from_transport(&peer, err)),
            Err(_) => Err(MeshError::Timeout {
                peer: peer.name,
                after: options.timeout,
            }),
        }
    }

    /// Tell `to` something without waiting for a reply
    pub async fn notify_peer(&self, from: &str, to: &str, text: &str) -> Result<(), MeshError> {
        self.notify_peer_with(from, to, text, &self.defaults).await
    }

    pub async fn notify_peer_with(
        &self,
        from: &str,
        to: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<(), MeshError> {
        let (peer, transport) = self.resolve(to)?;
        let options = options.clone().with_source(from);
        transport
            .send_notification(&peer.session_handle, &format_notification(from, text), &options)
            .await
            .map_err(|e| MeshError::from_transport(&peer, e))
    }

    /// Notify every registered peer except `from`
    ///
    /// Deliveries run concurrently and fail independently; this never fails
    /// as a whole.
    pub async fn broadcast(&self, from: &str, text: &str) -> BroadcastReport {
        let options = self.defaults.clone().with_source(from);
        let formatted = format_broadcast(from, text);

        let targets: Vec<Peer> = self
            .registry
            .list_all()
            .into_iter()
            .filter(|peer| peer.name != from)
            .collect();

        let deliveries = targets.into_iter().map(|peer| {
            let options = &options;
            let formatted = &formatted;
            async move {
                let result = match self.transports.get(&peer.kind) {
                    Some(transport) => transport
                        .send_notification(&peer.session_handle, formatted, options)
                        .await
                        .map_err(|e| MeshError::from_transport(&peer, e)),
                    None => Err(MeshError::NoTransport(peer.kind)),
                };
                if let Err(e) = &result {
                    tracing::warn!("broadcast to {} failed: {}", peer.name, e);
                }
                (peer.name, result)
            }
        });

        BroadcastReport {
            results: join_all(deliveries).await.into_iter().collect(),
        }
    }

    /// Close every distinct transport
    pub async fn close(&self) {
        let mut closed: Vec<&Arc<dyn Transport>> = Vec::new();
        for transport in self.transports.values() {
            if closed.iter().any(|seen| Arc::ptr_eq(seen, transport)) {
                continue;
            }
            if let Err(e) = transport.close().await {
                tracing::warn!("error closing {:?} transport: {}", transport.kind(), e);
            }
            closed.push(transport);
        }
    }
}

/// Serves calls other processes forward over the local bridge socket
#[async_trait]
impl RequestHandler for Mesh {
    async fn handle(&self, request: BridgeRequest) -> BridgeResponse {
        match request {
            BridgeRequest::Ask {
                from,
                to,
                text,
                timeout_secs,
                permission_mode,
            } => {
                let mut options = self.defaults.clone().with_permission_mode(permission_mode);
                if let Some(secs) = timeout_secs {
                    options = options.with_timeout(Duration::from_secs(secs));
                }
                match self.ask_peer_with(&from, &to, &text, &options).await {
                    Ok(reply) => BridgeResponse::reply(reply),
                    Err(e) => BridgeResponse::failed(e),
                }
            }
            BridgeRequest::Notify { from, to, text } => {
                match self.notify_peer(&from, &to, &text).await {
                    Ok(()) => BridgeResponse::ok(),
                    Err(e) => BridgeResponse::failed(e),
                }
            }
            BridgeRequest::Broadcast { from, text } => {
                let report = self.broadcast(&from, &text).await;
                BridgeResponse::broadcast(
                    report
                        .results
                        .into_iter()
                        .map(|(peer, result)| (peer, result.err().map(|e| e.to_string())))
                        .collect(),
                )
            }
        }
    }
}
