//! Delivery backends behind one contract
//!
//! A [`Transport`] moves text to a session and, for queries, waits for the
//! single reply. Three implementations exist:
//!
//! - [`BusTransport`]: in-process [`MessageBus`] between agents in one process
//! - [`CloudTransport`]: the encrypted relay for cloud-hosted sessions
//! - [`LocalBridge`]: a terminal pane on this machine, replies arrive over IPC

mod bus;
pub mod cloud;
mod local;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::CryptoError;
use crate::message::CorrelationError;

pub use bus::{BusTransport, MessageBus, MessageHandler, DEFAULT_LOG_CAPACITY};
pub use cloud::CloudTransport;
pub use local::{
    BridgeClient, BridgeRequest, BridgeResponse, BridgeStatus, HookReply, LocalBridge,
    LocalBridgeConfig, PaneDriver, PendingQuery, RequestHandler, TmuxPane,
};

/// Default wait for a query round trip
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("transport is shut down")]
    Shutdown,
    #[error("unknown target: {0}")]
    UnknownTarget(String),
    #[error("no session key available for session {0}")]
    KeyUnavailable(String),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<CorrelationError> for TransportError {
    fn from(err: CorrelationError) -> Self {
        match err {
            CorrelationError::Timeout(after) => TransportError::Timeout(after),
            CorrelationError::Shutdown => TransportError::Shutdown,
            CorrelationError::Duplicate(id) => {
                TransportError::Protocol(format!("correlation id {} reused", id))
            }
        }
    }
}

/// The three backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Bus,
    Cloud,
    LocalBridge,
}

/// How much autonomy the receiving session gets for the message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionMode {
    #[default]
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "plan")]
    Plan,
    #[serde(rename = "yolo")]
    Yolo,
    #[serde(rename = "bypassPermissions")]
    BypassPermissions,
    #[serde(rename = "acceptEdits")]
    AcceptEdits,
    #[serde(rename = "read-only")]
    ReadOnly,
    #[serde(rename = "safe-yolo")]
    SafeYolo,
}

impl PermissionMode {
    pub const ALL: [PermissionMode; 7] = [
        PermissionMode::Default,
        PermissionMode::Plan,
        PermissionMode::Yolo,
        PermissionMode::BypassPermissions,
        PermissionMode::AcceptEdits,
        PermissionMode::ReadOnly,
        PermissionMode::SafeYolo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::Plan => "plan",
            PermissionMode::Yolo => "yolo",
            PermissionMode::BypassPermissions => "bypassPermissions",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::ReadOnly => "read-only",
            PermissionMode::SafeYolo => "safe-yolo",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionMode {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PermissionMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| TransportError::Protocol(format!("unknown permission mode: {}", s)))
    }
}

/// Per-call options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOptions {
    pub timeout: Duration,
    pub permission_mode: PermissionMode,
    /// Name of the sending peer, when known
    pub source: Option<String>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_QUERY_TIMEOUT,
            permission_mode: PermissionMode::Default,
            source: None,
        }
    }
}

impl SendOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = mode;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Uniform contract over every delivery backend
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    fn kind(&self) -> TransportKind;

    /// Deliver `text` and wait for the single reply
    async fn send_message(
        &self,
        target_handle: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<String, TransportError>;

    /// Deliver `text` without waiting
    async fn send_notification(
        &self,
        target_handle: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<(), TransportError>;

    /// Release connections and fail outstanding queries with
    ///  [`TransportError::Shutdown`]
    async fn close(&self) -> Result<(), TransportError>;
}
