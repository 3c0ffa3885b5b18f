use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};

use super::{SendOptions, Transport, TransportError, TransportKind};
use crate::message::{Correlator, Message, MessageType};

/// Messages kept for [`MessageBus::message_log`]
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Receives messages addressed to one agent on the bus
///
/// For a query, a returned payload is sent back to the source as the
/// matching response. For everything else the return value is ignored.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message) -> Option<Value>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Option<Value>> + Send + 'static,
{
    async fn handle(&self, message: Message) -> Option<Value> {
        (self)(message).await
    }
}

struct BusInner {
    handlers: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
    pending: Correlator<Message>,
    log: Mutex<VecDeque<Message>>,
    log_capacity: usize,
}

/// In-process router between named agents
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("agents", &self.registered_agents())
            .field("pending", &self.inner.pending)
            .finish()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self::with_log_capacity(DEFAULT_LOG_CAPACITY)
    }

    pub fn with_log_capacity(log_capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                handlers: RwLock::new(HashMap::new()),
                pending: Correlator::new(),
                log: Mutex::new(VecDeque::new()),
                log_capacity,
            }),
        }
    }

    pub fn register_handler(&self, agent: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        let agent = agent.into();
        tracing::debug!("registering bus handler for {}", agent);
        self.inner.handlers.write().insert(agent, handler);
    }

    pub fn unregister_handler(&self, agent: &str) -> bool {
        self.inner.handlers.write().remove(agent).is_some()
    }

    pub fn registered_agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = self.inner.handlers.read().keys().cloned().collect();
        agents.sort();
        agents
    }

    /// Route a message without waiting for any reply
    ///
    /// Responses resolve their pending query. Broadcasts reach every
    /// handler except the source's own. Queries and notifications go to
    /// their target, which must have a handler.
    pub fn send(&self, message: Message) -> Result<(), TransportError> {
        message
            .validate()
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        self.record(&message);

        match message.kind {
            MessageType::Response => {
                self.deliver_response(message);
            }
            MessageType::Broadcast => {
                let handlers: Vec<_> = self
                    .inner
                    .handlers
                    .read()
                    .iter()
                    .filter(|(agent, _)| **agent != message.source)
                    .map(|(agent, handler)| (agent.clone(), handler.clone()))
                    .collect();
                for (agent, handler) in handlers {
                    self.dispatch(agent, handler, message.clone());
                }
            }
            MessageType::Query | MessageType::Notification => {
                let target = message.target.clone().unwrap_or_default();
                let handler = self
                    .inner
                    .handlers
                    .read()
                    .get(&target)
                    .cloned()
                    .ok_or_else(|| TransportError::UnknownTarget(target.clone()))?;
                self.dispatch(target, handler, message);
            }
        }
        Ok(())
    }

    /// Send a query and wait for its response
    ///
    /// The pending entry exists before the query is routed, so a handler
    /// that answers immediately cannot be missed.
    pub async fn query(&self, message: Message, timeout: Duration) -> Result<Message, TransportError> {
        if message.kind != MessageType::Query {
            return Err(TransportError::Protocol(format!(
                "expected a query, got {:?}",
                message.kind
            )));
        }
        let pending = self.inner.pending.register(message.correlation_key(), timeout)?;
        self.send(message)?;
        Ok(pending.wait().await?)
    }

    /// The most recent `limit` messages, oldest first
    pub fn message_log(&self, limit: usize) -> Vec<Message> {
        let log = self.inner.log.lock();
        let skip = log.len().saturating_sub(limit);
        log.iter().skip(skip).cloned().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Fail outstanding queries, further queries are refused
    pub fn close(&self) -> usize {
        self.inner.pending.close()
    }

    fn record(&self, message: &Message) {
        if self.inner.log_capacity == 0 {
            return;
        }
        let mut log = self.inner.log.lock();
        if log.len() == self.inner.log_capacity {
            log.pop_front();
        }
        log.push_back(message.clone());
    }

    fn deliver_response(&self, message: Message) {
        let correlation_id = message.correlation_key();
        if !self.inner.pending.resolve(&correlation_id, message) {
            tracing::debug!("no pending query for response {}", correlation_id);
        }
    }

    fn dispatch(&self, agent: String, handler: Arc<dyn MessageHandler>, message: Message) {
        let bus = self.clone();
        tokio::spawn(async move {
            let is_query = message.kind == MessageType::Query;
            let query = if is_query { Some(message.clone()) } else { None };
            let reply = handler.handle(message).await;

            match (query, reply) {
                (Some(query), Some(payload)) => {
                    let response = query.reply(agent, payload);
                    bus.record(&response);
                    bus.deliver_response(response);
                }
                (Some(query), None) => {
                    tracing::debug!("{} left query {} unanswered", agent, query.id);
                }
                _ => {}
            }
        });
    }
}

/// [`Transport`] over a [`MessageBus`]
///
/// Text travels as a `{"text": ...}` payload; the reply's `text` field is the
/// result.
#[derive(Debug, Clone)]
pub struct BusTransport {
    bus: MessageBus,
    agent: String,
}

impl BusTransport {
    /// `agent` is the default source for messages without one
    pub fn new(bus: MessageBus, agent: impl Into<String>) -> Self {
        Self {
            bus,
            agent: agent.into(),
        }
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    fn source(&self, options: &SendOptions) -> String {
        options.source.clone().unwrap_or_else(|| self.agent.clone())
    }
}

#[async_trait]
impl Transport for BusTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Bus
    }

    async fn send_message(
        &self,
        target_handle: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<String, TransportError> {
        let query = Message::query(
            self.source(options),
            target_handle,
            json!({ "text": text, "permission_mode": options.permission_mode }),
        );
        let response = self.bus.query(query, options.timeout).await?;
        Ok(match response.text() {
            Some(text) => text.to_string(),
            None => response.payload.to_string(),
        })
    }

    async fn send_notification(
        &self,
        target_handle: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<(), TransportError> {
        let notification = Message::notification(
            self.source(options),
            target_handle,
            json!({ "text": text, "permission_mode": options.permission_mode }),
        );
        self.bus.send(notification)
    }

    async fn close(&self) -> Result<(), TransportError> {
        let cancelled = self.bus.close();
        tracing::debug!("bus transport closed, cancelled {} queries", cancelled);
        Ok(())
    }
}
