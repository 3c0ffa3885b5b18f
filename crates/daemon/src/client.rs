//! Mesh calls from one-shot commands
//!
//! When a daemon owns the bridge socket, calls are forwarded to it over that
//! socket. Otherwise a short-lived [`MeshService`] runs the call in this
//! process and shuts down again.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use common::auth::Credentials;
use common::transport::{
    BridgeClient, BridgeRequest, BridgeResponse, PaneDriver, PermissionMode, RequestHandler,
    TmuxPane, TransportError,
};

use crate::{MeshService, ServiceConfig, ServiceError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("daemon connection error: {0}")]
    Daemon(#[from] TransportError),
    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct MeshClient {
    config: ServiceConfig,
    credentials: Option<Credentials>,
    pane: Arc<dyn PaneDriver>,
}

impl MeshClient {
    pub fn new(config: ServiceConfig, credentials: Option<Credentials>) -> Self {
        Self {
            config,
            credentials,
            pane: Arc::new(TmuxPane),
        }
    }

    /// Pane driver for the in-process fallback
    pub fn with_pane(mut self, pane: Arc<dyn PaneDriver>) -> Self {
        self.pane = pane;
        self
    }

    /// Sender name used when a caller gives none
    pub fn agent_name(&self) -> &str {
        &self.config.agent_name
    }

    pub async fn ask(
        &self,
        from: &str,
        to: &str,
        text: &str,
        timeout: Option<Duration>,
        permission_mode: PermissionMode,
    ) -> Result<String, ClientError> {
        let response = self
            .dispatch(BridgeRequest::Ask {
                from: from.to_string(),
                to: to.to_string(),
                text: text.to_string(),
                timeout_secs: timeout.map(|t| t.as_secs()),
                permission_mode,
            })
            .await?;
        Ok(response.response.unwrap_or_default())
    }

    pub async fn notify(&self, from: &str, to: &str, text: &str) -> Result<(), ClientError> {
        self.dispatch(BridgeRequest::Notify {
            from: from.to_string(),
            to: to.to_string(),
            text: text.to_string(),
        })
        .await?;
        Ok(())
    }

    /// Per-peer outcome, `None` when delivered
    pub async fn broadcast(
        &self,
        from: &str,
        text: &str,
    ) -> Result<BTreeMap<String, Option<String>>, ClientError> {
        let response = self
            .dispatch(BridgeRequest::Broadcast {
                from: from.to_string(),
                text: text.to_string(),
            })
            .await?;
        Ok(response.results.unwrap_or_default())
    }

    async fn dispatch(&self, request: BridgeRequest) -> Result<BridgeResponse, ClientError> {
        let daemon = BridgeClient::new(&self.config.socket_path);
        let response = match daemon.request(&request).await? {
            Some(response) => {
                tracing::debug!("served by the daemon on {}", daemon.socket_path().display());
                response
            }
            None => {
                tracing::debug!("no daemon listening, running the mesh in-process");
                let service = MeshService::start_with_pane(
                    &self.config,
                    self.credentials.as_ref(),
                    self.pane.clone(),
                )
                .await?;
                let response = service.mesh().handle(request).await;
                service.shutdown().await;
                response
            }
        };

        if response.is_ok() {
            Ok(response)
        } else {
            Err(ClientError::Rejected(
                response.error.unwrap_or_else(|| "request failed".to_string()),
            ))
        }
    }
}
