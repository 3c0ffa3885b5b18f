//! Composition root: builds the transports and the mesh from a [`ServiceConfig`]

use std::sync::Arc;

use common::auth::{AuthError, Credentials};
use common::crypto::EncryptionManager;
use common::mesh::Mesh;
use common::peer::{PeerKind, PeerRegistry};
use common::transport::cloud::{CloudConfig, HttpSessionDirectory, SocketIoConnector};
use common::transport::{
    CloudTransport, LocalBridge, LocalBridgeConfig, PaneDriver, SendOptions, TmuxPane,
    TransportError,
};

use crate::ServiceConfig;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("credentials error: {0}")]
    Auth(#[from] AuthError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Everything one running instance owns
#[derive(Debug, Clone)]
pub struct MeshService {
    registry: Arc<PeerRegistry>,
    mesh: Mesh,
    bridge: LocalBridge,
    cloud: Option<CloudTransport>,
    agent_name: String,
}

impl MeshService {
    /// Start with panes driven through tmux
    pub async fn start(
        config: &ServiceConfig,
        credentials: Option<&Credentials>,
    ) -> Result<Self, ServiceError> {
        Self::start_with_pane(config, credentials, Arc::new(TmuxPane)).await
    }

    pub async fn start_with_pane(
        config: &ServiceConfig,
        credentials: Option<&Credentials>,
        pane: Arc<dyn PaneDriver>,
    ) -> Result<Self, ServiceError> {
        let registry = Arc::new(PeerRegistry::new());
        for peer in &config.peers {
            registry.register(peer.clone());
        }

        // credentials are checked before anything binds
        let cloud = match credentials {
            Some(credentials) => Some(cloud_transport(config, credentials)?),
            None => {
                tracing::info!("no relay credentials, cloud peers are unreachable");
                None
            }
        };

        let bridge = LocalBridge::new(
            LocalBridgeConfig {
                socket_path: config.socket_path.clone(),
                pending_dir: config.pending_dir.clone(),
                default_source: config.agent_name.clone(),
            },
            pane,
        );
        bridge.start().await?;

        let mut mesh = Mesh::new(registry.clone())
            .with_default_options(SendOptions::default().with_timeout(config.query_timeout))
            .with_transport(PeerKind::Local, Arc::new(bridge.clone()));
        if let Some(cloud) = &cloud {
            mesh = mesh.with_transport(PeerKind::Cloud, Arc::new(cloud.clone()));
        }
        // other processes on this machine ask through our socket
        bridge.set_request_handler(Arc::new(mesh.clone()));

        tracing::info!(
            "mesh started with {} peers (relay: {})",
            registry.len(),
            if cloud.is_some() { "enabled" } else { "disabled" }
        );
        Ok(Self {
            registry,
            mesh,
            bridge,
            cloud,
            agent_name: config.agent_name.clone(),
        })
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    pub fn bridge(&self) -> &LocalBridge {
        &self.bridge
    }

    pub fn cloud(&self) -> Option<&CloudTransport> {
        self.cloud.as_ref()
    }

    /// Sender name used when a caller gives none
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Close every transport, failing outstanding asks
    pub async fn shutdown(&self) {
        self.mesh.close().await;
        tracing::info!("mesh shut down");
    }
}

/// The relay transport alone, for callers that do not need the local bridge
pub fn cloud_transport(
    config: &ServiceConfig,
    credentials: &Credentials,
) -> Result<CloudTransport, ServiceError> {
    let encryption = Arc::new(EncryptionManager::new(credentials.master_secret()?));
    tracing::debug!(
        "content public key {}",
        encryption.content_keys().public_key_base64()
    );

    let connector = SocketIoConnector::new(
        &config.server_url,
        credentials.token.clone(),
        config.connect_timeout,
    )?;
    let directory = HttpSessionDirectory::new(&config.server_url, &credentials.token)?;

    Ok(CloudTransport::new(
        Arc::new(connector),
        Arc::new(directory),
        encryption,
        CloudConfig {
            connect_timeout: config.connect_timeout,
            ..CloudConfig::default()
        },
    ))
}
