//! The message envelope and the correlation engine that pairs
//!  queries with their responses

mod correlation;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub use correlation::{CorrelationError, Correlator, PendingResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Query,
    Response,
    Notification,
    Broadcast,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("{0:?} message requires a target")]
    MissingTarget(MessageType),
    #[error("broadcast message must not carry a target")]
    BroadcastWithTarget,
    #[error("response message requires a correlation id")]
    MissingCorrelation,
}

/// One unit of traffic between peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub source: String,
    /// `None` only for broadcasts
    pub target: Option<String>,
    pub payload: Value,
    pub correlation_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn build(
        kind: MessageType,
        source: impl Into<String>,
        target: Option<String>,
        payload: Value,
        correlation_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            source: source.into(),
            target,
            payload,
            correlation_id,
            timestamp: Utc::now(),
        }
    }

    /// A query correlated by its own id
    pub fn query(source: impl Into<String>, target: impl Into<String>, payload: Value) -> Self {
        let mut message = Self::build(
            MessageType::Query,
            source,
            Some(target.into()),
            payload,
            None,
        );
        message.correlation_id = Some(message.id);
        message
    }

    pub fn query_with_correlation(
        source: impl Into<String>,
        target: impl Into<String>,
        payload: Value,
        correlation_id: Uuid,
    ) -> Self {
        Self::build(
            MessageType::Query,
            source,
            Some(target.into()),
            payload,
            Some(correlation_id),
        )
    }

    pub fn response(
        source: impl Into<String>,
        target: impl Into<String>,
        payload: Value,
        correlation_id: Uuid,
    ) -> Self {
        Self::build(
            MessageType::Response,
            source,
            Some(target.into()),
            payload,
            Some(correlation_id),
        )
    }

    /// The response answering `self`, addressed back to its source
    pub fn reply(&self, source: impl Into<String>, payload: Value) -> Self {
        Self::response(source, self.source.clone(), payload, self.correlation_key())
    }

    pub fn notification(
        source: impl Into<String>,
        target: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self::build(
            MessageType::Notification,
            source,
            Some(target.into()),
            payload,
            None,
        )
    }

    pub fn broadcast(source: impl Into<String>, payload: Value) -> Self {
        Self::build(MessageType::Broadcast, source, None, payload, None)
    }

    /// The id responses are matched on, defaulting to the message id
    pub fn correlation_key(&self) -> Uuid {
        self.correlation_id.unwrap_or(self.id)
    }

    /// Convenience accessor for `{"text": ...}` payloads
    pub fn text(&self) -> Option<&str> {
        self.payload.get("text").and_then(Value::as_str)
    }

    pub fn validate(&self) -> Result<(), MessageError> {
        match (self.kind, &self.target) {
            (MessageType::Broadcast, Some(_)) => return Err(MessageError::BroadcastWithTarget),
            (MessageType::Broadcast, None) => {}
            (kind, None) => return Err(MessageError::MissingTarget(kind)),
            _ => {}
        }
        if self.kind == MessageType::Response && self.correlation_id.is_none() {
            return Err(MessageError::MissingCorrelation);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_correlates_by_own_id() {
        let query = Message::query("a", "b", json!({"text": "hi"}));
        assert_eq!(query.correlation_id, Some(query.id));
        assert_eq!(query.text(), Some("hi"));
        assert!(query.validate().is_ok());

        let explicit = Uuid::new_v4();
        let query = Message::query_with_correlation("a", "b", json!(null), explicit);
        assert_eq!(query.correlation_key(), explicit);
    }

    #[test]
    fn test_reply_carries_correlation() {
        let query = Message::query("a", "b", json!({}));
        let reply = query.reply("b", json!({"text": "ok"}));
        assert_eq!(reply.kind, MessageType::Response);
        assert_eq!(reply.target.as_deref(), Some("a"));
        assert_eq!(reply.correlation_id, Some(query.id));
    }

    #[test]
    fn test_validate_shapes() {
        let broadcast = Message::broadcast("a", json!({}));
        assert!(broadcast.target.is_none());
        assert!(broadcast.validate().is_ok());

        let mut bad = broadcast.clone();
        bad.target = Some("b".into());
        assert_eq!(bad.validate(), Err(MessageError::BroadcastWithTarget));

        let mut response = Message::response("a", "b", json!({}), Uuid::new_v4());
        response.correlation_id = None;
        assert_eq!(response.validate(), Err(MessageError::MissingCorrelation));

        let mut note = Message::notification("a", "b", json!({}));
        note.target = None;
        assert_eq!(
            note.validate(),
            Err(MessageError::MissingTarget(MessageType::Notification))
        );
    }

    #[test]
    fn test_message_serde_shape() {
        let message = Message::notification("a", "b", json!({"text": "x"}));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "notification");
        assert!(value["correlation_id"].is_null());

        let parsed: Message = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, message);
    }
}
