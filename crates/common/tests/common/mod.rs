//! Shared test utilities for mesh and transport integration tests
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use ::common::crypto::{EncryptionManager, MasterSecret};
use ::common::testkit::{MemoryConnector, MemoryRelay, StaticDirectory};
use ::common::transport::cloud::CloudConfig;
use ::common::transport::{
    CloudTransport, SendOptions, Transport, TransportError, TransportKind,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One call seen by a [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub target: String,
    pub text: String,
    pub options: SendOptions,
    pub query: bool,
}

/// A transport that records what it is asked to deliver
///
/// Queries are answered with `reply`, after `delay`. Targets added with
/// [`RecordingTransport::fail_for`] get a connection error.
#[derive(Debug)]
pub struct RecordingTransport {
    kind: TransportKind,
    reply: String,
    delay: Duration,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Call>>,
    closes: Mutex<usize>,
}

impl RecordingTransport {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            kind: TransportKind::LocalBridge,
            reply: reply.into(),
            delay: Duration::ZERO,
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            closes: Mutex::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_for(&self, target: &str) {
        self.failing.lock().insert(target.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn close_count(&self) -> usize {
        *self.closes.lock()
    }

    fn record(&self, target: &str, text: &str, options: &SendOptions, query: bool) -> Result<(), TransportError> {
        self.calls.lock().push(Call {
            target: target.to_string(),
            text: text.to_string(),
            options: options.clone(),
            query,
        });
        if self.failing.lock().contains(target) {
            return Err(TransportError::Connection(format!("{} is unreachable", target)));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn send_message(
        &self,
        target_handle: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<String, TransportError> {
        self.record(target_handle, text, options, true)?;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.reply.clone())
    }

    async fn send_notification(
        &self,
        target_handle: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<(), TransportError> {
        self.record(target_handle, text, options, false)
    }

    async fn close(&self) -> Result<(), TransportError> {
        *self.closes.lock() += 1;
        Ok(())
    }
}

/// Both ends of a cloud transport wired to an in-memory relay
pub struct CloudHarness {
    pub transport: CloudTransport,
    pub relay: MemoryRelay,
    pub directory: Arc<StaticDirectory>,
    /// This client's encryption
    pub local: Arc<EncryptionManager>,
    /// Another client of the same account, playing the remote session
    pub remote: EncryptionManager,
}

pub fn setup_cloud() -> CloudHarness {
    setup_cloud_with(|connector| connector, CloudConfig::default())
}

pub fn setup_cloud_with(
    connector: impl FnOnce(MemoryConnector) -> MemoryConnector,
    config: CloudConfig,
) -> CloudHarness {
    let master = MasterSecret::generate();
    let local = Arc::new(EncryptionManager::new(master.clone()));
    let remote = EncryptionManager::new(master);
    let (relay, memory_connector) = MemoryRelay::new();
    let directory = Arc::new(StaticDirectory::new());

    let transport = CloudTransport::new(
        Arc::new(connector(memory_connector)),
        directory.clone(),
        local.clone(),
        config,
    );

    CloudHarness {
        transport,
        relay,
        directory,
        local,
        remote,
    }
}
