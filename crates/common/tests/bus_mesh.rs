//! The mesh running entirely in-process over the message bus

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use ::common::mesh::{Mesh, MeshError};
use ::common::message::{Message, MessageType};
use ::common::peer::{Peer, PeerKind, PeerRegistry};
use ::common::transport::{BusTransport, MessageBus, MessageHandler, SendOptions};

fn answering(prefix: &'static str) -> Arc<dyn MessageHandler> {
    Arc::new(move |message: Message| async move {
        let text = message.text().unwrap_or_default().to_string();
        Some(json!({ "text": format!("{}: {}", prefix, text) }))
    })
}

fn recording(tx: mpsc::UnboundedSender<Message>) -> Arc<dyn MessageHandler> {
    Arc::new(move |message: Message| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(message);
            None
        }
    })
}

fn setup(bus: &MessageBus) -> Mesh {
    let registry = Arc::new(PeerRegistry::new());
    registry.register(Peer::local("backend", "agent-backend"));
    registry.register(Peer::local("frontend", "agent-frontend"));
    Mesh::new(registry).with_transport(
        PeerKind::Local,
        Arc::new(BusTransport::new(bus.clone(), "mesh")),
    )
}

#[tokio::test]
async fn test_ask_over_bus() {
    common::init_tracing();
    let bus = MessageBus::new();
    bus.register_handler("agent-backend", answering("backend"));
    let mesh = setup(&bus);

    let reply = mesh.ask_peer("frontend", "backend", "ready?").await.unwrap();
    assert_eq!(reply, "backend: @frontend asks: ready?");

    let log = bus.message_log(10);
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].kind, MessageType::Query);
    assert_eq!(log[0].source, "frontend");
    assert_eq!(log[1].kind, MessageType::Response);
    assert_eq!(log[1].correlation_id, Some(log[0].id));
    assert_eq!(bus.pending_count(), 0);
}

#[tokio::test]
async fn test_unanswered_bus_query_times_out() {
    let bus = MessageBus::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    bus.register_handler("agent-backend", recording(tx));
    let mesh = setup(&bus);

    let options = SendOptions::default().with_timeout(Duration::from_millis(50));
    let err = mesh
        .ask_peer_with("frontend", "backend", "hello?", &options)
        .await
        .unwrap_err();
    assert!(matches!(err, MeshError::Timeout { .. }));
    assert_eq!(rx.recv().await.unwrap().kind, MessageType::Query);
    assert_eq!(bus.pending_count(), 0);
}

#[tokio::test]
async fn test_peer_without_bus_handler_is_a_transport_error() {
    let bus = MessageBus::new();
    let mesh = setup(&bus);

    let err = mesh.notify_peer("frontend", "backend", "hi").await.unwrap_err();
    assert!(matches!(err, MeshError::Transport { .. }));
}

#[tokio::test]
async fn test_broadcast_over_bus_skips_originator() {
    let bus = MessageBus::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    bus.register_handler("agent-backend", recording(tx.clone()));
    bus.register_handler("agent-frontend", recording(tx));
    let mesh = setup(&bus);

    let report = mesh.broadcast("frontend", "release cut").await;
    assert!(report.all_succeeded());
    assert_eq!(report.succeeded(), vec!["backend"]);

    let delivered = rx.recv().await.unwrap();
    assert_eq!(delivered.kind, MessageType::Notification);
    assert_eq!(delivered.target.as_deref(), Some("agent-backend"));
    assert_eq!(delivered.text(), Some("[BROADCAST from frontend]: release cut"));
    assert!(rx.try_recv().is_err());
}
