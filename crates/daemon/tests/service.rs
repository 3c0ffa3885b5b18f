//! Integration tests for the composition root

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

use common::auth::Credentials;
use common::peer::{Peer, PeerKind};
use common::transport::{PaneDriver, PendingQuery, TransportError};
use meshwire_daemon::state::{AppConfig, AppState};
use common::transport::PermissionMode;
use meshwire_daemon::{start_service, ClientError, MeshClient, MeshService, ServiceConfig, ServiceError};

/// Answers every query by echoing it back through the bridge socket,
/// the way the reply hook would
#[derive(Debug)]
struct EchoPane {
    socket_path: PathBuf,
    pending_dir: PathBuf,
}

#[async_trait]
impl PaneDriver for EchoPane {
    async fn send_text(&self, target: &str, text: &str) -> Result<(), TransportError> {
        let file = self.pending_dir.join(format!("{}.json", target));
        let Ok(raw) = tokio::fs::read(&file).await else {
            // notifications have no pending file
            return Ok(());
        };
        let pending: PendingQuery = serde_json::from_slice(&raw).unwrap();
        let reply = serde_json::json!({
            "correlation_id": pending.correlation_id,
            "response": format!("echo {}", text),
        });

        let socket_path = self.socket_path.clone();
        tokio::spawn(async move {
            let mut stream = UnixStream::connect(&socket_path).await.unwrap();
            stream.write_all(reply.to_string().as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        });
        Ok(())
    }
}

fn service_config(dir: &Path) -> ServiceConfig {
    let config = AppConfig {
        socket_path: dir.join("bridge.sock"),
        peers: vec![
            Peer::local("backend", "backend-pane"),
            Peer::cloud("reviewer", "sess-1"),
        ],
        ..AppConfig::default()
    };
    let state = AppState::init(Some(dir.join("state")), Some(config)).unwrap();
    ServiceConfig::from_state(&state).unwrap()
}

fn echo_pane(config: &ServiceConfig) -> Arc<EchoPane> {
    Arc::new(EchoPane {
        socket_path: config.socket_path.clone(),
        pending_dir: config.pending_dir.clone(),
    })
}

#[tokio::test]
async fn test_local_ask_through_started_service() {
    let dir = tempfile::tempdir().unwrap();
    let config = service_config(dir.path());

    let service = MeshService::start_with_pane(&config, None, echo_pane(&config))
        .await
        .unwrap();
    assert_eq!(service.registry().len(), 2);
    assert!(service.cloud().is_none());

    let reply = service
        .mesh()
        .ask_peer("cli", "backend", "status?")
        .await
        .unwrap();
    assert_eq!(reply, "echo @cli asks: status?");

    // without credentials, cloud peers have no transport
    let err = service
        .mesh()
        .ask_peer("cli", "reviewer", "status?")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        common::mesh::MeshError::NoTransport(PeerKind::Cloud)
    ));

    service.shutdown().await;
    assert!(!config.socket_path.exists());
}

#[tokio::test]
async fn test_credentials_enable_the_relay() {
    let dir = tempfile::tempdir().unwrap();
    let config = service_config(dir.path());
    let credentials = Credentials {
        token: "token".into(),
        secret: "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8".into(),
    };

    let service = MeshService::start_with_pane(&config, Some(&credentials), echo_pane(&config))
        .await
        .unwrap();
    let cloud = service.cloud().unwrap();
    assert_eq!(
        cloud.encryption().master(),
        &credentials.master_secret().unwrap()
    );
    assert_eq!(service.mesh().default_options().timeout, Duration::from_secs(120));
    service.shutdown().await;
}

#[tokio::test]
async fn test_bad_secret_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let config = service_config(dir.path());
    let credentials = Credentials {
        token: "token".into(),
        secret: "not-a-secret".into(),
    };

    let err = MeshService::start_with_pane(&config, Some(&credentials), echo_pane(&config))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Auth(_)));
}

#[tokio::test]
async fn test_second_service_on_same_socket_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let config = service_config(dir.path());

    let first = MeshService::start_with_pane(&config, None, echo_pane(&config))
        .await
        .unwrap();
    let err = MeshService::start_with_pane(&config, None, echo_pane(&config))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Transport(TransportError::Connection(_))
    ));
    first.shutdown().await;
}

#[tokio::test]
async fn test_cli_ask_is_served_by_the_running_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let config = service_config(dir.path());

    let daemon = MeshService::start_with_pane(&config, None, echo_pane(&config))
        .await
        .unwrap();

    // the command's own pane driver is never used while the daemon is up
    let client = MeshClient::new(config.clone(), None);
    let reply = client
        .ask("cli", "backend", "status?", None, PermissionMode::Default)
        .await
        .unwrap();
    assert_eq!(reply, "echo @cli asks: status?");

    client.notify("cli", "backend", "heads up").await.unwrap();

    let results = client.broadcast("cli", "deploying").await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results["backend"], None);
    assert!(results["reviewer"]
        .as_deref()
        .unwrap()
        .contains("no transport registered"));

    let err = client
        .ask("cli", "ghost", "hello?", None, PermissionMode::Default)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Rejected(ref msg) if msg == "unknown peer: ghost"));

    // the daemon kept its socket and still serves
    assert!(config.socket_path.exists());
    assert_eq!(daemon.bridge().pending_count(), 0);
    daemon.shutdown().await;
    assert!(!config.socket_path.exists());
}

#[tokio::test]
async fn test_cli_runs_in_process_without_a_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let config = service_config(dir.path());

    let client = MeshClient::new(config.clone(), None).with_pane(echo_pane(&config));
    assert_eq!(client.agent_name(), "meshwire");

    let reply = client
        .ask("cli", "backend", "status?", Some(Duration::from_secs(5)), PermissionMode::Plan)
        .await
        .unwrap();
    assert_eq!(reply, "echo @cli asks: status?");
    // the short-lived mesh cleaned up after itself
    assert!(!config.socket_path.exists());

    let err = client.notify("cli", "ghost", "hi").await.unwrap_err();
    assert!(matches!(err, ClientError::Rejected(ref msg) if msg == "unknown peer: ghost"));
}

#[tokio::test]
async fn test_shutdown_handle_stops_the_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let config = service_config(dir.path());

    let (_service, handle) = start_service(&config, None).await;
    assert!(config.socket_path.exists());

    let client = MeshClient::new(config.clone(), None);
    let err = client.notify("cli", "ghost", "hi").await.unwrap_err();
    assert!(matches!(err, ClientError::Rejected(_)));

    handle.shutdown();
    handle.wait().await;
    assert!(!config.socket_path.exists());
}
