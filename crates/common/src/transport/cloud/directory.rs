use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::transport::TransportError;

/// One session as listed by the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    /// Session key wrapped to the content key pair, standard base64
    #[serde(default)]
    pub data_encryption_key: Option<String>,
    /// Free-form metadata encrypted with the session's own scheme
    #[serde(default)]
    pub metadata: Option<String>,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Deserialize)]
struct SessionsResponse {
    #[serde(default)]
    sessions: Vec<SessionRecord>,
}

/// A session with its metadata decrypted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub active: bool,
    pub path: Option<String>,
    pub host: Option<String>,
    /// Always an object, empty when absent or undecryptable
    pub metadata: Value,
}

impl SessionInfo {
    pub fn new(id: impl Into<String>, active: bool, metadata: Option<Value>) -> Self {
        let metadata = match metadata {
            Some(Value::Object(map)) => Value::Object(map),
            _ => Value::Object(Map::new()),
        };
        let field = |name: &str| metadata.get(name).and_then(Value::as_str).map(String::from);
        Self {
            id: id.into(),
            active,
            path: field("path"),
            host: field("host"),
            metadata: metadata.clone(),
        }
    }
}

/// Source of session records
#[async_trait]
pub trait SessionDirectory: Send + Sync + std::fmt::Debug {
    async fn fetch_sessions(&self) -> Result<Vec<SessionRecord>, TransportError>;
}

/// Lists sessions from `GET {server}/v1/sessions`
#[derive(Debug, Clone)]
pub struct HttpSessionDirectory {
    sessions_url: Url,
    client: Client,
}

impl HttpSessionDirectory {
    pub fn new(server_url: &Url, token: &str) -> Result<Self, TransportError> {
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| TransportError::Protocol("token is not a valid header value".into()))?;
        bearer.set_sensitive(true);

        let mut default_headers = HeaderMap::new();
        default_headers.insert(AUTHORIZATION, bearer);
        let client = Client::builder().default_headers(default_headers).build()?;

        let sessions_url = server_url
            .join("v1/sessions")
            .map_err(|e| TransportError::Protocol(format!("bad relay url: {}", e)))?;

        Ok(Self {
            sessions_url,
            client,
        })
    }

    pub fn sessions_url(&self) -> &Url {
        &self.sessions_url
    }
}

#[async_trait]
impl SessionDirectory for HttpSessionDirectory {
    async fn fetch_sessions(&self) -> Result<Vec<SessionRecord>, TransportError> {
        let response = self.client.get(self.sessions_url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Connection(format!(
                "session listing failed with {}: {}",
                status, body
            )));
        }
        let listing: SessionsResponse = response.json().await?;
        tracing::debug!("fetched {} sessions", listing.sessions.len());
        Ok(listing.sessions)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_record_wire_shape() {
        let listing: SessionsResponse = serde_json::from_value(json!({
            "sessions": [
                {"id": "a", "dataEncryptionKey": "AAAA", "metadata": "BBBB", "active": true, "seq": 4},
                {"id": "b"}
            ]
        }))
        .unwrap();
        assert_eq!(listing.sessions.len(), 2);
        assert_eq!(listing.sessions[0].data_encryption_key.as_deref(), Some("AAAA"));
        assert!(listing.sessions[0].active);
        assert!(listing.sessions[1].data_encryption_key.is_none());
        assert!(!listing.sessions[1].active);

        let empty: SessionsResponse = serde_json::from_value(json!({})).unwrap();
        assert!(empty.sessions.is_empty());
    }

    #[test]
    fn test_session_info_from_metadata() {
        let info = SessionInfo::new(
            "a",
            true,
            Some(json!({"path": "/src/app", "host": "devbox", "flavor": "x"})),
        );
        assert_eq!(info.path.as_deref(), Some("/src/app"));
        assert_eq!(info.host.as_deref(), Some("devbox"));

        let info = SessionInfo::new("b", false, Some(json!("not an object")));
        assert_eq!(info.metadata, json!({}));
        assert!(info.path.is_none());
        assert_eq!(SessionInfo::new("c", false, None).metadata, json!({}));
    }

    #[test]
    fn test_sessions_url() {
        let url = Url::parse("https://api.cluster-fluster.com").unwrap();
        let directory = HttpSessionDirectory::new(&url, "tok").unwrap();
        assert_eq!(
            directory.sessions_url().as_str(),
            "https://api.cluster-fluster.com/v1/sessions"
        );
        assert!(HttpSessionDirectory::new(&url, "bad\ntoken").is_err());
    }
}
