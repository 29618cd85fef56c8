//! STOMP over WebSocket live channel
//!
//! One shared broker connection per channel, opened lazily on the first
//! subscribe. Outbound frames go through a writer task; a reader task
//! routes MESSAGE frames by their `subscription` header into the sink
//! registered for that subscription. A dropped connection is re-opened on
//! the next subscribe, re-issuing every live SUBSCRIBE.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::application::ports::{ChannelMessage, LiveChannel, SubscriptionHandle};
use crate::domain::{SyncError, SyncResult};

use super::frame::{StompCommand, StompFrame, FRAME_TERMINATOR};

type Routes = Arc<DashMap<String, Route>>;

struct Route {
    handle: SubscriptionHandle,
    sink: mpsc::Sender<ChannelMessage>,
}

struct Connection {
    outbound: mpsc::UnboundedSender<Message>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl Connection {
    fn is_alive(&self) -> bool {
        !self.outbound.is_closed() && !self.reader.is_finished()
    }

    fn send(&self, frame: &StompFrame) -> SyncResult<()> {
        debug!(frame = %frame, "STOMP ->");
        self.outbound
            .send(Message::Text(frame.serialize().into()))
            .map_err(|_| SyncError::Network("broker connection closed".to_string()))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Live channel backed by a STOMP 1.2 broker
pub struct StompChannel {
    ws_url: String,
    connect_timeout: Duration,
    connection: Mutex<Option<Connection>>,
    routes: Routes,
}

impl StompChannel {
    pub fn new(ws_url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            ws_url: ws_url.into(),
            connect_timeout,
            connection: Mutex::new(None),
            routes: Arc::new(DashMap::new()),
        }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    pub async fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .is_some_and(Connection::is_alive)
    }

    /// Send DISCONNECT and close the socket. Open subscriptions are dropped.
    pub async fn disconnect(&self) {
        let connection = self.connection.lock().await.take();
        self.routes.clear();
        if let Some(connection) = connection {
            if connection.is_alive() {
                let _ = connection.send(&StompFrame::disconnect());
                let _ = connection.outbound.send(Message::Close(None));
                // let the writer flush before the drop aborts it
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            info!(url = %self.ws_url, "Disconnected from broker");
        }
    }

    async fn connect(&self) -> SyncResult<Connection> {
        info!(url = %self.ws_url, "Connecting to broker");

        let connecting = connect_async(self.ws_url.as_str());
        let (ws_stream, _) = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| SyncError::Network(format!("timed out connecting to {}", self.ws_url)))?
            .map_err(|e| SyncError::Network(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let connect = StompFrame::connect(broker_host(&self.ws_url), (0, 0));
        write
            .send(Message::Text(connect.serialize().into()))
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        let handshake = async {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if StompFrame::is_heartbeat(&text) {
                            continue;
                        }
                        match StompFrame::parse(&text) {
                            Ok(frame) if frame.command == StompCommand::Connected => {
                                return Ok(frame);
                            }
                            Ok(frame) if frame.command == StompCommand::Error => {
                                return Err(SyncError::Network(error_text(&frame)));
                            }
                            Ok(frame) => debug!(frame = %frame, "Ignoring frame before CONNECTED"),
                            Err(e) => warn!(error = %e, "Undecodable frame during handshake"),
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        return Err(SyncError::Network(format!(
                            "broker closed during handshake: {frame:?}"
                        )));
                    }
                    Ok(_) => {}
                    Err(e) => return Err(SyncError::Network(e.to_string())),
                }
            }
            Err(SyncError::Network("broker closed during handshake".to_string()))
        };

        let connected = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| SyncError::Network("timed out waiting for CONNECTED".to_string()))??;
        info!(
            url = %self.ws_url,
            version = connected.get_header("version").unwrap_or("1.0"),
            "Connected to broker"
        );

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    error!(error = %e, "Broker send error");
                    break;
                }
            }
        });

        let routes = self.routes.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => dispatch(&routes, &text),
                    Ok(Message::Binary(data)) => {
                        warn!(bytes = data.len(), "Binary message from broker, ignoring");
                    }
                    Ok(Message::Close(frame)) => {
                        info!(?frame, "Broker closed the connection");
                        break;
                    }
                    // pong is sent by tungstenite
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "Broker connection error");
                        break;
                    }
                }
            }
            debug!("Broker reader stopped");
        });

        Ok(Connection {
            outbound,
            writer,
            reader,
        })
    }
}

#[async_trait]
impl LiveChannel for StompChannel {
    async fn subscribe_topic(
        &self,
        topic: &str,
        sink: mpsc::Sender<ChannelMessage>,
    ) -> SyncResult<SubscriptionHandle> {
        let mut guard = self.connection.lock().await;

        if !guard.as_ref().is_some_and(Connection::is_alive) {
            *guard = None;
            let connection = self.connect().await?;
            for route in self.routes.iter() {
                connection.send(&StompFrame::subscribe(route.key(), &route.handle.topic))?;
                debug!(topic = %route.handle.topic, "Re-subscribed after reconnect");
            }
            *guard = Some(connection);
        }

        let connection = guard
            .as_ref()
            .ok_or_else(|| SyncError::Network("broker connection unavailable".to_string()))?;

        let handle = SubscriptionHandle::new(topic);
        let id = handle.id.to_string();
        connection.send(&StompFrame::subscribe(&id, topic))?;
        self.routes.insert(
            id,
            Route {
                handle: handle.clone(),
                sink,
            },
        );
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let id = handle.id.to_string();
        if self.routes.remove(&id).is_none() {
            return;
        }

        let guard = self.connection.lock().await;
        if let Some(connection) = guard.as_ref().filter(|c| c.is_alive()) {
            if let Err(e) = connection.send(&StompFrame::unsubscribe(&id)) {
                debug!(topic = %handle.topic, error = %e, "UNSUBSCRIBE not sent");
            }
        }
    }

    async fn is_open(&self, handle: &SubscriptionHandle) -> bool {
        self.routes.contains_key(&handle.id.to_string()) && self.is_connected().await
    }
}

/// Route every frame in one WebSocket text message.
fn dispatch(routes: &DashMap<String, Route>, text: &str) {
    for chunk in text.split(FRAME_TERMINATOR) {
        if StompFrame::is_heartbeat(chunk) {
            continue;
        }
        let frame = match StompFrame::parse(chunk) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Undecodable frame from broker");
                continue;
            }
        };

        match frame.command {
            StompCommand::Message => deliver(routes, frame),
            StompCommand::Error => warn!(message = %error_text(&frame), "Broker ERROR frame"),
            StompCommand::Receipt => {
                debug!(receipt = frame.get_header("receipt-id").unwrap_or_default(), "Receipt")
            }
            other => debug!(command = %other, "Ignoring frame"),
        }
    }
}

fn deliver(routes: &DashMap<String, Route>, frame: StompFrame) {
    let Some(id) = frame.get_header("subscription") else {
        warn!(frame = %frame, "MESSAGE without subscription header");
        return;
    };
    let Some(route) = routes.get(id) else {
        debug!(subscription = id, "MESSAGE for closed subscription");
        return;
    };

    let message = ChannelMessage {
        subscription: route.handle.id,
        topic: route.handle.topic.clone(),
        body: frame.body,
    };
    match route.sink.try_send(message) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            warn!(topic = %route.handle.topic, "Inbox full, dropping push message");
        }
        Err(TrySendError::Closed(_)) => {
            debug!(topic = %route.handle.topic, "Inbox closed");
        }
    }
}

fn error_text(frame: &StompFrame) -> String {
    match frame.get_header("message") {
        Some(message) if frame.body.is_empty() => message.to_string(),
        Some(message) => format!("{message}: {}", frame.body.trim()),
        None => frame.body.trim().to_string(),
    }
}

/// `host` header value: the authority of the WebSocket URL.
fn broker_host(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    rest.split(['/', '?']).next().unwrap_or(rest)
}
