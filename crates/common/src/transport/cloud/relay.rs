//! The relay connection: a Socket.IO session over WebSocket
//!
//! A connection is a pair of channels. Outbound [`Packet`]s go through a
//! single writer task, so concurrent emits are serialized per frame. Inbound
//! events arrive on a [`flume::Receiver`] fed by a reader task that also
//! answers pings.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

use super::frame::Packet;
use crate::transport::TransportError;

/// Path of the relay's Socket.IO endpoint
pub const UPDATES_PATH: &str = "v1/updates/";
/// Client type announced in the connect auth
pub const CLIENT_TYPE: &str = "user-scoped";

/// An event received from the relay
#[derive(Debug, Clone, PartialEq)]
pub struct RelayEvent {
    pub name: String,
    pub data: Value,
}

/// Write half of a relay connection
#[derive(Debug, Clone)]
pub struct RelaySender {
    frames: flume::Sender<Packet>,
}

impl RelaySender {
    pub fn new(frames: flume::Sender<Packet>) -> Self {
        Self { frames }
    }

    pub async fn emit(&self, name: &str, data: Value) -> Result<(), TransportError> {
        self.frames
            .send_async(Packet::event(name, data))
            .await
            .map_err(|_| TransportError::Connection("relay connection is closed".into()))
    }

    /// True once the writer side has gone away
    pub fn is_closed(&self) -> bool {
        self.frames.is_disconnected()
    }

    pub async fn disconnect(&self) {
        let _ = self.frames.send_async(Packet::Disconnect).await;
    }
}

/// Both halves of an established relay connection
#[derive(Debug)]
pub struct RelayChannel {
    pub sender: RelaySender,
    pub events: flume::Receiver<RelayEvent>,
}

/// Opens relay connections
#[async_trait]
pub trait RelayConnector: Send + Sync + std::fmt::Debug {
    async fn connect(&self) -> Result<RelayChannel, TransportError>;
}

/// Connects to the relay's Socket.IO endpoint with a bearer token
#[derive(Debug, Clone)]
pub struct SocketIoConnector {
    endpoint: Url,
    token: String,
    handshake_timeout: Duration,
}

impl SocketIoConnector {
    pub fn new(server_url: &Url, token: impl Into<String>, handshake_timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            endpoint: updates_endpoint(server_url)?,
            token: token.into(),
            handshake_timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn auth(&self) -> Value {
        json!({ "token": self.token, "clientType": CLIENT_TYPE })
    }
}

/// `https://host/base` -> `wss://host/base/v1/updates/?EIO=4&transport=websocket`
pub fn updates_endpoint(server_url: &Url) -> Result<Url, TransportError> {
    let scheme = match server_url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(TransportError::Connection(format!(
                "unsupported relay url scheme: {}",
                other
            )))
        }
    };
    let mut url = server_url.clone();
    url.set_scheme(scheme)
        .map_err(|_| TransportError::Connection(format!("cannot use {} for {}", scheme, server_url)))?;
    let path = format!("{}/{}", url.path().trim_end_matches('/'), UPDATES_PATH);
    url.set_path(&path);
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

fn ws_error(err: tokio_tungstenite::tungstenite::Error) -> TransportError {
    TransportError::Connection(format!("websocket error: {}", err))
}

#[async_trait]
impl RelayConnector for SocketIoConnector {
    async fn connect(&self) -> Result<RelayChannel, TransportError> {
        tracing::info!("connecting to relay at {}", self.endpoint);
        let (socket, _) = tokio_tungstenite::connect_async(self.endpoint.as_str())
            .await
            .map_err(ws_error)?;
        let (mut sink, mut stream) = socket.split();

        let handshake = async {
            let mut opened = false;
            while let Some(message) = stream.next().await {
                let text = match message.map_err(ws_error)? {
                    WsMessage::Text(text) => text,
                    WsMessage::Close(_) => break,
                    _ => continue,
                };
                match Packet::decode(&text) {
                    Ok(Packet::Open(params)) => {
                        tracing::debug!("relay engine open: {}", params);
                        opened = true;
                        sink.send(WsMessage::Text(Packet::Connect(Some(self.auth())).encode()))
                            .await
                            .map_err(ws_error)?;
                    }
                    Ok(Packet::Connect(_)) if opened => return Ok(()),
                    Ok(Packet::ConnectError(err)) => {
                        return Err(TransportError::Connection(format!(
                            "relay rejected connection: {}",
                            err
                        )))
                    }
                    Ok(Packet::Ping) => {
                        sink.send(WsMessage::Text(Packet::Pong.encode()))
                            .await
                            .map_err(ws_error)?;
                    }
                    Ok(other) => tracing::debug!("ignoring frame during handshake: {:?}", other),
                    Err(e) => tracing::warn!("bad frame during handshake: {}", e),
                }
            }
            Err::<(), _>(TransportError::Connection(
                "relay closed the connection during handshake".into(),
            ))
        };
        tokio::time::timeout(self.handshake_timeout, handshake)
            .await
            .map_err(|_| {
                TransportError::Connection(format!(
                    "relay handshake timed out after {:?}",
                    self.handshake_timeout
                ))
            })??;
        tracing::info!("relay connection established");

        let (frame_tx, frame_rx) = flume::unbounded::<Packet>();
        let (event_tx, event_rx) = flume::unbounded::<RelayEvent>();
        let (closed_tx, mut closed_rx) = oneshot::channel::<()>();

        // writer
        tokio::spawn(async move {
            loop {
                let packet = tokio::select! {
                    packet = frame_rx.recv_async() => match packet {
                        Ok(packet) => packet,
                        Err(_) => break,
                    },
                    _ = &mut closed_rx => break,
                };
                let last = matches!(packet, Packet::Disconnect);
                if let Err(e) = sink.send(WsMessage::Text(packet.encode())).await {
                    tracing::warn!("relay write failed: {}", e);
                    break;
                }
                if last {
                    break;
                }
            }
            let _ = sink.close().await;
            tracing::debug!("relay writer stopped");
        });

        // reader
        let pong_tx = frame_tx.clone();
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let text = match message {
                    Ok(WsMessage::Text(text)) => text,
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!("relay read failed: {}", e);
                        break;
                    }
                };
                match Packet::decode(&text) {
                    Ok(Packet::Ping) => {
                        if pong_tx.send_async(Packet::Pong).await.is_err() {
                            break;
                        }
                    }
                    Ok(Packet::Event { name, data, .. }) => {
                        if event_tx.send_async(RelayEvent { name, data }).await.is_err() {
                            break;
                        }
                    }
                    Ok(Packet::Disconnect) | Ok(Packet::Close) => break,
                    Ok(_) => {}
                    Err(e) => tracing::warn!("dropping malformed relay frame: {}", e),
                }
            }
            let _ = closed_tx.send(());
            tracing::info!("relay connection closed");
        });

        Ok(RelayChannel {
            sender: RelaySender::new(frame_tx),
            events: event_rx,
        })
    }
}
