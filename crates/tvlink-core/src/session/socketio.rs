//! Socket.IO control channel over a WebSocket.
//!
//! One spawned task per connection attempt performs the Engine.IO/Socket.IO
//! handshake, answers server pings, forwards queued events and reports
//! `connect` / `connect_error` / `disconnect` back to the session.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::channel::{channel_pair, ChannelEvent, ControlChannel, ControlConnector, OutboundEvent};
use crate::error::ConnectionError;
use crate::protocol::{EnginePacket, Handshake, SocketPacket, DEFAULT_NAMESPACE};
use crate::types::ControlEndpoint;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Disconnect reasons, worded the way Socket.IO clients report them.
const REASON_SERVER_DISCONNECT: &str = "io server disconnect";
const REASON_CLIENT_DISCONNECT: &str = "io client disconnect";
const REASON_TRANSPORT_CLOSE: &str = "transport close";

/// How long a closed channel may spend flushing queued events before the
/// task is aborted.
pub const CLOSE_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct SocketIoConnector {
    connect_timeout: Duration,
}

impl SocketIoConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl ControlConnector for SocketIoConnector {
    fn open(&self, endpoint: &ControlEndpoint) -> ControlChannel {
        let url = endpoint.websocket_url();
        let connect_timeout = self.connect_timeout;

        let (channel, ends) = channel_pair();
        let done = ends.done;
        let mut task = tokio::spawn(run_channel(url, connect_timeout, ends.events, ends.outbound));

        // The session drops the sender before closing, which lets the task
        // drain the queue and send a disconnect packet.
        channel.on_close(move || match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if timeout(CLOSE_GRACE, &mut task).await.is_err() {
                        task.abort();
                        let _ = task.await;
                    }
                    drop(done);
                });
            }
            Err(_) => task.abort(),
        })
    }
}

async fn run_channel(
    url: String,
    connect_timeout: Duration,
    events: mpsc::UnboundedSender<ChannelEvent>,
    outbound: mpsc::UnboundedReceiver<OutboundEvent>,
) {
    let (ws, handshake) = match timeout(connect_timeout, handshake(&url)).await {
        Err(_) => {
            let _ = events.send(ChannelEvent::ConnectError(ConnectionError::Timeout.to_string()));
            return;
        }
        Ok(Err(e)) => {
            debug!(%url, "control channel handshake failed: {}", e);
            let _ = events.send(ChannelEvent::ConnectError(e.to_string()));
            return;
        }
        Ok(Ok(opened)) => opened,
    };

    if events.send(ChannelEvent::Connect).is_err() {
        return;
    }

    let reason = run_session(ws, &handshake, outbound).await;
    debug!(%url, %reason, "control channel closed");
    let _ = events.send(ChannelEvent::Disconnect(reason.to_string()));
}

/// Open the WebSocket and join the default namespace.
async fn handshake(url: &str) -> Result<(WsStream, Handshake), ConnectionError> {
    let (mut ws, _) = connect_async(url)
        .await
        .map_err(|e| ConnectionError::WebSocket(e.to_string()))?;

    let handshake = loop {
        match next_packet(&mut ws).await? {
            EnginePacket::Open(handshake) => break handshake,
            other => debug!(?other, "packet before open"),
        }
    };
    debug!(sid = %handshake.sid, "engine.io session open");

    send_socket_packet(&mut ws, &SocketPacket::connect()).await?;

    loop {
        match next_packet(&mut ws).await? {
            EnginePacket::Message(data) => match SocketPacket::decode(&data) {
                Ok(SocketPacket::Connect { namespace, .. }) if namespace == DEFAULT_NAMESPACE => {
                    return Ok((ws, handshake));
                }
                Ok(SocketPacket::ConnectError { message, .. }) => {
                    return Err(ConnectionError::Rejected(message));
                }
                Ok(other) => debug!(?other, "packet before connect"),
                Err(e) => warn!("Bad Socket.IO packet during handshake: {}", e),
            },
            EnginePacket::Ping(data) => {
                send_text(&mut ws, EnginePacket::Pong(data).encode()).await?;
            }
            EnginePacket::Close => {
                return Err(ConnectionError::Handshake(
                    "server closed the session".to_string(),
                ))
            }
            _ => {}
        }
    }
}

/// Read until the next Engine.IO packet.
async fn next_packet(ws: &mut WsStream) -> Result<EnginePacket, ConnectionError> {
    while let Some(message) = ws.next().await {
        match message {
            Ok(Message::Text(text)) => match EnginePacket::decode(&text) {
                Ok(packet) => return Ok(packet),
                Err(e) => warn!("Bad Engine.IO packet: {}", e),
            },
            Ok(Message::Close(_)) => {
                return Err(ConnectionError::Closed(REASON_TRANSPORT_CLOSE.to_string()))
            }
            Ok(_) => continue,
            Err(e) => return Err(ConnectionError::WebSocket(e.to_string())),
        }
    }

    Err(ConnectionError::Closed(REASON_TRANSPORT_CLOSE.to_string()))
}

async fn send_text(ws: &mut WsStream, text: String) -> Result<(), ConnectionError> {
    ws.send(Message::Text(text))
        .await
        .map_err(|e| ConnectionError::WebSocket(e.to_string()))
}

async fn send_socket_packet(ws: &mut WsStream, packet: &SocketPacket) -> Result<(), ConnectionError> {
    send_text(ws, EnginePacket::Message(packet.encode()).encode()).await
}

/// Drive an established session. Returns why it ended.
async fn run_session(
    ws: WsStream,
    handshake: &Handshake,
    mut outbound: mpsc::UnboundedReceiver<OutboundEvent>,
) -> ConnectionError {
    let (mut write, mut read) = ws.split();
    let window = handshake.liveness_window();
    let mut deadline = Instant::now() + window;

    loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => match EnginePacket::decode(&text) {
                    Ok(EnginePacket::Ping(data)) => {
                        deadline = Instant::now() + window;
                        let pong = EnginePacket::Pong(data).encode();
                        if let Err(e) = write.send(Message::Text(pong)).await {
                            return ConnectionError::WebSocket(e.to_string());
                        }
                    }
                    Ok(EnginePacket::Message(data)) => match SocketPacket::decode(&data) {
                        Ok(SocketPacket::Disconnect { .. }) => {
                            return ConnectionError::Closed(REASON_SERVER_DISCONNECT.to_string());
                        }
                        Ok(SocketPacket::Event { name, args, .. }) => {
                            debug!(event = %name, ?args, "event from receiver");
                        }
                        Ok(other) => debug!(?other, "ignoring packet"),
                        Err(e) => warn!("Bad Socket.IO packet: {}", e),
                    },
                    Ok(EnginePacket::Close) => {
                        return ConnectionError::Closed(REASON_TRANSPORT_CLOSE.to_string());
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Bad Engine.IO packet: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => {
                    return ConnectionError::Closed(REASON_TRANSPORT_CLOSE.to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return ConnectionError::WebSocket(e.to_string()),
            },
            queued = outbound.recv() => match queued {
                Some(event) => {
                    let packet = SocketPacket::event(&event.name, vec![json!(event.payload)]);
                    let text = EnginePacket::Message(packet.encode()).encode();
                    debug!(event = %event.name, "sending event");
                    if let Err(e) = write.send(Message::Text(text)).await {
                        return ConnectionError::WebSocket(e.to_string());
                    }
                }
                None => {
                    let goodbye = SocketPacket::Disconnect {
                        namespace: DEFAULT_NAMESPACE.to_string(),
                    };
                    let _ = write
                        .send(Message::Text(EnginePacket::Message(goodbye.encode()).encode()))
                        .await;
                    let _ = write.close().await;
                    return ConnectionError::Closed(REASON_CLIENT_DISCONNECT.to_string());
                }
            },
            _ = sleep_until(deadline) => return ConnectionError::PingTimeout,
        }
    }
}
