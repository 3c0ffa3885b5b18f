//! Bridge to agent sessions running in terminal panes on this machine
//!
//! A query is typed into the target pane. The agent's stop hook finds the
//! pending-query file written for that pane, and once the agent has
//! answered it sends `{"correlation_id": ..., "response": ...}` to the
//! bridge's Unix socket. The bridge answers `{"status":"ok"}`.
//!
//! The same socket takes mesh calls from other processes on this machine,
//! `{"op": "ask" | "notify" | "broadcast", ...}`, and hands them to the
//! installed [`RequestHandler`]. [`BridgeClient`] is the calling side.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{PermissionMode, SendOptions, Transport, TransportError, TransportKind};
use crate::message::Correlator;

/// Largest JSON document accepted on the socket, in either direction
const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Types text into a pane
#[async_trait]
pub trait PaneDriver: Send + Sync + std::fmt::Debug {
    async fn send_text(&self, target: &str, text: &str) -> Result<(), TransportError>;
}

/// Drives tmux panes with `tmux send-keys`
#[derive(Debug, Clone, Default)]
pub struct TmuxPane;

#[async_trait]
impl PaneDriver for TmuxPane {
    async fn send_text(&self, target: &str, text: &str) -> Result<(), TransportError> {
        let output = tokio::process::Command::new("tmux")
            .args(["send-keys", "-t", target, "-l", text])
            .output()
            .await?;
        if !output.status.success() {
            return Err(TransportError::UnknownTarget(format!(
                "{} ({})",
                target,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let output = tokio::process::Command::new("tmux")
            .args(["send-keys", "-t", target, "Enter"])
            .output()
            .await?;
        if !output.status.success() {
            return Err(TransportError::Connection(format!(
                "tmux send-keys Enter failed for {}",
                target
            )));
        }
        Ok(())
    }
}

/// Written to the pending directory while a query is outstanding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingQuery {
    pub correlation_id: Uuid,
    pub from_peer: String,
    pub to_peer: String,
    pub query: String,
    pub timestamp: DateTime<Utc>,
}

/// What the hook sends back over the socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookReply {
    pub correlation_id: Uuid,
    #[serde(alias = "response_text")]
    pub response: String,
}

/// A mesh call forwarded to the process that owns the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BridgeRequest {
    Ask {
        from: String,
        to: String,
        text: String,
        /// Overrides the owner's default query timeout
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_secs: Option<u64>,
        #[serde(default)]
        permission_mode: PermissionMode,
    },
    Notify {
        from: String,
        to: String,
        text: String,
    },
    Broadcast {
        from: String,
        text: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStatus {
    #[default]
    Ok,
    Error,
}

/// Answer written back on the socket
///
/// A bare `{"status":"ok"}` acknowledges a hook reply or a notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub status: BridgeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Broadcast outcome per peer, `None` when delivered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<BTreeMap<String, Option<String>>>,
}

impl BridgeResponse {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            response: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn failed(err: impl std::fmt::Display) -> Self {
        Self {
            status: BridgeStatus::Error,
            error: Some(err.to_string()),
            ..Self::default()
        }
    }

    pub fn broadcast(results: BTreeMap<String, Option<String>>) -> Self {
        Self {
            results: Some(results),
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == BridgeStatus::Ok
    }
}

/// Serves [`BridgeRequest`]s arriving on the bridge socket
#[async_trait]
pub trait RequestHandler: Send + Sync + std::fmt::Debug {
    async fn handle(&self, request: BridgeRequest) -> BridgeResponse;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Inbound {
    Request(BridgeRequest),
    Reply(HookReply),
}

#[derive(Debug, Clone)]
pub struct LocalBridgeConfig {
    pub socket_path: PathBuf,
    pub pending_dir: PathBuf,
    /// Reported as `from_peer` when the caller does not name itself
    pub default_source: String,
}

#[derive(Debug)]
struct BridgeInner {
    config: LocalBridgeConfig,
    pane: Arc<dyn PaneDriver>,
    pending: Correlator<String>,
    handler: Mutex<Option<Arc<dyn RequestHandler>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug, Clone)]
pub struct LocalBridge {
    inner: Arc<BridgeInner>,
}

impl LocalBridge {
    pub fn new(config: LocalBridgeConfig, pane: Arc<dyn PaneDriver>) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                config,
                pane,
                pending: Correlator::new(),
                handler: Mutex::new(None),
                listener: Mutex::new(None),
            }),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.inner.config.socket_path
    }

    pub fn pending_dir(&self) -> &Path {
        &self.inner.config.pending_dir
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Accept forwarded mesh calls on the socket
    ///
    /// Without a handler, requests are answered with an error. The handler
    /// is dropped on [`close`](Transport::close).
    pub fn set_request_handler(&self, handler: Arc<dyn RequestHandler>) {
        *self.inner.handler.lock() = Some(handler);
    }

    /// Bind the reply socket, replacing a stale one
    ///
    /// Fails if another bridge is still answering on the socket.
    pub async fn start(&self) -> Result<(), TransportError> {
        let config = &self.inner.config;
        tokio::fs::create_dir_all(&config.pending_dir).await?;
        if let Some(parent) = config.socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if UnixStream::connect(&config.socket_path).await.is_ok() {
            return Err(TransportError::Connection(format!(
                "a bridge is already listening on {}",
                config.socket_path.display()
            )));
        }
        remove_if_exists(&config.socket_path).await?;

        let listener = UnixListener::bind(&config.socket_path)?;
        tracing::info!("local bridge listening on {}", config.socket_path.display());

        let handle = tokio::spawn(accept_loop(listener, Arc::downgrade(&self.inner)));
        if let Some(previous) = self.inner.listener.lock().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Deliver a hook reply directly, as the socket would
    pub fn handle_reply(&self, reply: HookReply) -> bool {
        self.inner.pending.resolve(&reply.correlation_id, reply.response)
    }

    fn pending_file(&self, target_handle: &str) -> PathBuf {
        let name = target_handle.replace('/', "_");
        self.inner.config.pending_dir.join(format!("{}.json", name))
    }

    fn source(&self, options: &SendOptions) -> String {
        options
            .source
            .clone()
            .unwrap_or_else(|| self.inner.config.default_source.clone())
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), std::io::Error> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

async fn accept_loop(listener: UnixListener, inner: Weak<BridgeInner>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, &inner).await {
                        tracing::warn!("bad bridge connection: {}", e);
                    }
                });
            }
            Err(e) => {
                tracing::warn!("local bridge accept failed: {}", e);
                break;
            }
        }
    }
}

/// Read one JSON document, stopping at EOF or as soon as it parses
async fn read_json<T: DeserializeOwned>(stream: &mut UnixStream) -> Result<Option<T>, TransportError> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Ok(Some(serde_json::from_slice(&buf)?));
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > MAX_MESSAGE_SIZE {
            return Err(TransportError::Protocol("bridge message too large".into()));
        }
        if let Ok(message) = serde_json::from_slice(&buf) {
            return Ok(Some(message));
        }
    }
}

async fn serve_connection(mut stream: UnixStream, inner: &BridgeInner) -> Result<(), TransportError> {
    let Some(inbound) = read_json::<Inbound>(&mut stream).await? else {
        return Ok(());
    };

    let response = match inbound {
        Inbound::Reply(reply) => {
            if !inner.pending.resolve(&reply.correlation_id, reply.response) {
                tracing::debug!("hook reply for {} had no waiting query", reply.correlation_id);
            }
            BridgeResponse::ok()
        }
        Inbound::Request(request) => {
            let handler = inner.handler.lock().clone();
            match handler {
                Some(handler) => handler.handle(request).await,
                None => BridgeResponse::failed("this bridge does not accept requests"),
            }
        }
    };

    stream.write_all(&serde_json::to_vec(&response)?).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Sends [`BridgeRequest`]s to the bridge another process owns
#[derive(Debug, Clone)]
pub struct BridgeClient {
    socket_path: PathBuf,
}

impl BridgeClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send one request and wait for the answer
    ///
    /// Returns `Ok(None)` when nothing is listening on the socket.
    pub async fn request(
        &self,
        request: &BridgeRequest,
    ) -> Result<Option<BridgeResponse>, TransportError> {
        let mut stream = match UnixStream::connect(&self.socket_path).await {
            Ok(stream) => stream,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
                ) =>
            {
                return Ok(None)
            }
            Err(e) => return Err(e.into()),
        };

        stream.write_all(&serde_json::to_vec(request)?).await?;
        stream.shutdown().await?;
        match read_json::<BridgeResponse>(&mut stream).await? {
            Some(response) => Ok(Some(response)),
            None => Err(TransportError::Protocol(
                "bridge closed the connection without answering".into(),
            )),
        }
    }
}

#[async_trait]
impl Transport for LocalBridge {
    fn kind(&self) -> TransportKind {
        TransportKind::LocalBridge
    }

    async fn send_message(
        &self,
        target_handle: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<String, TransportError> {
        let correlation_id = Uuid::new_v4();
        let pending = self.inner.pending.register(correlation_id, options.timeout)?;

        let file = self.pending_file(target_handle);
        let record = PendingQuery {
            correlation_id,
            from_peer: self.source(options),
            to_peer: target_handle.to_string(),
            query: text.to_string(),
            timestamp: Utc::now(),
        };
        tokio::fs::write(&file, serde_json::to_vec(&record)?).await?;

        let result = async {
            self.inner.pane.send_text(target_handle, text).await?;
            Ok(pending.wait().await?)
        }
        .await;

        if let Err(e) = remove_if_exists(&file).await {
            tracing::warn!("could not remove {}: {}", file.display(), e);
        }
        result
    }

    async fn send_notification(
        &self,
        target_handle: &str,
        text: &str,
        _options: &SendOptions,
    ) -> Result<(), TransportError> {
        self.inner.pane.send_text(target_handle, text).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        let cancelled = self.inner.pending.close();
        if let Some(listener) = self.inner.listener.lock().take() {
            listener.abort();
        }
        self.inner.handler.lock().take();
        remove_if_exists(&self.inner.config.socket_path).await?;
        tracing::info!("local bridge closed, cancelled {} queries", cancelled);
        Ok(())
    }
}
