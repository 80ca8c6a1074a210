//! Notification subscriber.
//!
//! Opens a WebSocket to the server's notification endpoint, performs the
//! STOMP CONNECT/SUBSCRIBE handshake on the caller's task, then hands the
//! socket to background tasks:
//! - a read loop that classifies frames and calls the handler
//! - a write loop that drains outbound frames
//! - an optional heart-beat ticker
//!
//! A fault on an established session is reported once through the handler
//! and leaves the subscriber `Degraded`. It is never reconnected.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use dp5_core::config::{AppConfig, NotificationConfig};
use dp5_core::constants;
use dp5_core::error::{Dp5Error, Dp5Result};

use crate::events::{ConnectionState, NotificationEvent, NotificationHandler, SessionFrame};
use crate::stomp::{self, HeartBeat, StompCommand, StompFrame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

const SUBSCRIPTION_ID: &str = "sub-0";

/// Missed server heart-beats tolerated before the session is declared dead.
const HEARTBEAT_TOLERANCE: u32 = 3;

/// How long `close` waits for queued frames to reach the socket.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// A live subscription to the server's event topic.
pub struct NotificationSubscriber {
    url: String,
    topic: String,
    session_id: String,
    auto_receipt: bool,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    write_tx: Option<mpsc::UnboundedSender<Message>>,
    read_task: Option<JoinHandle<()>>,
    write_task: Option<JoinHandle<()>>,
    heartbeat_task: Option<JoinHandle<()>>,
}

impl NotificationSubscriber {
    /// Connect to `url` and subscribe to the default topic.
    pub async fn connect<H: NotificationHandler>(url: &str, handler: H) -> Dp5Result<Self> {
        Self::connect_with_config(url, &NotificationConfig::default(), handler).await
    }

    /// Connect using the notification URL and settings from app configuration.
    pub async fn from_config<H: NotificationHandler>(
        config: &AppConfig,
        handler: H,
    ) -> Dp5Result<Self> {
        Self::connect_with_config(&config.notification_url(), &config.notifications, handler)
            .await
    }

    /// Connect to `url`, subscribe to `config.topic`, and start receiving.
    ///
    /// Returns once the server has accepted the session and the SUBSCRIBE
    /// frame is on the wire. Any failure up to that point, including the
    /// handshake timeout, is a `Connection` error.
    pub async fn connect_with_config<H: NotificationHandler>(
        url: &str,
        config: &NotificationConfig,
        handler: H,
    ) -> Dp5Result<Self> {
        info!("connecting to notification endpoint {url}");
        let limit = config.connect_timeout();
        let handshake = match tokio::time::timeout(limit, handshake(url, config)).await {
            Ok(result) => result,
            Err(_) => Err(Dp5Error::Connection(format!(
                "handshake with {url} timed out after {}s",
                limit.as_secs()
            ))),
        };
        let handshake = handshake.map_err(|e| {
            warn!("notification connect failed: {e}");
            e
        })?;

        let Handshake {
            ws,
            session_id,
            outgoing_heartbeat,
            incoming_heartbeat,
        } = handshake;

        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let state_tx = Arc::new(state_tx);

        let (ws_write, ws_read) = ws.split();
        let (write_tx, write_rx) = mpsc::unbounded_channel::<Message>();
        let write_task = tokio::spawn(run_write_loop(ws_write, write_rx));

        let heartbeat_task = outgoing_heartbeat.map(|interval| {
            debug!("sending heart-beats every {}ms", interval.as_millis());
            tokio::spawn(run_heartbeat(write_tx.clone(), interval))
        });

        set_state(&state_tx, ConnectionState::Connected);
        info!(
            "notification session {session_id} subscribed to {}",
            config.topic
        );
        handler.on_connected(&session_id);

        let ctx = ReadContext {
            session_id: session_id.clone(),
            topic: config.topic.clone(),
            read_deadline: incoming_heartbeat.map(|i| i * HEARTBEAT_TOLERANCE),
            state_tx: state_tx.clone(),
        };
        let read_task = tokio::spawn(run_read_loop(ws_read, handler, ctx));

        Ok(Self {
            url: url.to_string(),
            topic: config.topic.clone(),
            session_id,
            auto_receipt: config.auto_receipt,
            state_tx,
            write_tx: Some(write_tx),
            read_task: Some(read_task),
            write_task: Some(write_task),
            heartbeat_task,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Session identity, as reported by the server or generated locally.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn subscription_id(&self) -> &str {
        SUBSCRIPTION_ID
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribe to connection state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Unsubscribe, disconnect, and stop the background tasks.
    ///
    /// No handler callbacks are made once this starts.
    pub async fn close(mut self) {
        let previous = set_state(&self.state_tx, ConnectionState::Disconnected);

        if let Some(task) = self.heartbeat_task.take() {
            task.abort();
        }

        if let Some(write_tx) = self.write_tx.take() {
            if previous == ConnectionState::Connected {
                let unsubscribe =
                    StompFrame::unsubscribe(SUBSCRIPTION_ID, self.receipt("unsubscribe").as_deref());
                let disconnect = StompFrame::disconnect(self.receipt("disconnect").as_deref());
                for frame in [unsubscribe, disconnect] {
                    let _ = write_tx.send(Message::Text(frame.encode().into()));
                }
            }
            let _ = write_tx.send(Message::Close(None));
        }

        if let Some(mut writer) = self.write_task.take() {
            if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut writer)
                .await
                .is_err()
            {
                warn!("timed out flushing notification session {}", self.session_id);
                writer.abort();
            }
        }

        if let Some(reader) = self.read_task.take() {
            reader.abort();
        }

        info!("notification session {} closed", self.session_id);
    }

    fn receipt(&self, what: &str) -> Option<String> {
        self.auto_receipt
            .then(|| format!("{what}-{SUBSCRIPTION_ID}"))
    }
}

impl Drop for NotificationSubscriber {
    fn drop(&mut self) {
        let tasks = [
            self.heartbeat_task.take(),
            self.write_task.take(),
            self.read_task.take(),
        ];
        let mut stopped = false;
        for task in tasks.into_iter().flatten() {
            task.abort();
            stopped = true;
        }
        if stopped {
            set_state(&self.state_tx, ConnectionState::Disconnected);
        }
    }
}

impl std::fmt::Debug for NotificationSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSubscriber")
            .field("url", &self.url)
            .field("topic", &self.topic)
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Update the state and log transitions. Returns the previous state.
fn set_state(
    state_tx: &watch::Sender<ConnectionState>,
    new_state: ConnectionState,
) -> ConnectionState {
    let previous = state_tx.send_replace(new_state);
    if previous != new_state {
        info!("notification state: {previous} -> {new_state}");
    }
    previous
}

// --- Handshake ---

struct Handshake {
    ws: WsStream,
    session_id: String,
    outgoing_heartbeat: Option<Duration>,
    incoming_heartbeat: Option<Duration>,
}

async fn handshake(url: &str, config: &NotificationConfig) -> Dp5Result<Handshake> {
    let (mut ws, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| Dp5Error::Connection(format!("failed to connect to {url}: {e}")))?;

    let client_beat = HeartBeat::new(config.heartbeat_ms, config.heartbeat_ms);
    send_frame(&mut ws, &StompFrame::connect(&host_of(url), client_beat)).await?;

    let connected = await_connected(&mut ws).await?;
    let server_beat = connected
        .headers
        .get("heart-beat")
        .map(HeartBeat::parse)
        .unwrap_or_default();
    let session_id = connected
        .headers
        .get("session")
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    debug!(
        "STOMP session {session_id} accepted (version {}, heart-beat {})",
        connected.headers.get("version").unwrap_or("1.0"),
        server_beat.to_header()
    );

    let receipt = config
        .auto_receipt
        .then(|| format!("subscribe-{SUBSCRIPTION_ID}"));
    send_frame(
        &mut ws,
        &StompFrame::subscribe(SUBSCRIPTION_ID, &config.topic, receipt.as_deref()),
    )
    .await?;

    Ok(Handshake {
        ws,
        session_id,
        outgoing_heartbeat: HeartBeat::outgoing_interval(client_beat, server_beat),
        incoming_heartbeat: HeartBeat::incoming_interval(client_beat, server_beat),
    })
}

async fn send_frame(ws: &mut WsStream, frame: &StompFrame) -> Dp5Result<()> {
    ws.send(Message::Text(frame.encode().into()))
        .await
        .map_err(|e| Dp5Error::Connection(format!("failed to send {}: {e}", frame.command)))
}

/// Wait for the server's answer to CONNECT.
async fn await_connected(ws: &mut WsStream) -> Dp5Result<StompFrame> {
    while let Some(msg) = ws.next().await {
        let msg = msg.map_err(|e| Dp5Error::Connection(format!("handshake failed: {e}")))?;
        let text = match msg {
            Message::Text(t) => t.as_str().to_owned(),
            Message::Binary(b) => String::from_utf8(b.to_vec())
                .map_err(|_| Dp5Error::Connection("handshake frame is not UTF-8".into()))?,
            Message::Close(_) => {
                return Err(Dp5Error::Connection(
                    "server closed the connection during handshake".into(),
                ))
            }
            _ => continue,
        };

        let frames = stomp::parse_frames(&text)
            .map_err(|e| Dp5Error::Connection(format!("invalid handshake frame: {e}")))?;
        let Some(frame) = frames.into_iter().next() else {
            continue;
        };
        return match frame.command {
            StompCommand::Connected => Ok(frame),
            StompCommand::Error => Err(Dp5Error::Connection(format!(
                "server rejected the session: {}",
                SessionFrame::from_frame(&frame)
            ))),
            other => Err(Dp5Error::Connection(format!(
                "expected CONNECTED, got {other}"
            ))),
        };
    }
    Err(Dp5Error::Connection(
        "connection closed during handshake".into(),
    ))
}

fn host_of(url: &str) -> String {
    url.parse::<Uri>()
        .ok()
        .and_then(|uri| uri.host().map(str::to_string))
        .unwrap_or_else(|| constants::DEFAULT_HOST.to_string())
}

// --- Background tasks ---

/// Write loop: drains the outbound channel into the socket.
async fn run_write_loop(mut ws_write: WsWrite, mut write_rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(msg) = write_rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if let Err(e) = ws_write.send(msg).await {
            warn!("notification write failed, closing write loop: {e}");
            break;
        }
        if closing {
            break;
        }
    }
}

/// Heart-beat loop: a bare EOL at the negotiated interval.
async fn run_heartbeat(write_tx: mpsc::UnboundedSender<Message>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // first tick is immediate

    loop {
        ticker.tick().await;
        if write_tx.send(Message::Text("\n".into())).is_err() {
            break;
        }
    }
}

struct ReadContext {
    session_id: String,
    topic: String,
    read_deadline: Option<Duration>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
}

impl ReadContext {
    fn closing(&self) -> bool {
        *self.state_tx.borrow() == ConnectionState::Disconnected
    }

    /// Report a session fault and mark the session degraded.
    fn fail<H: NotificationHandler>(&self, handler: &H, message: String) {
        if self.closing() {
            debug!("ignoring fault after close: {message}");
            return;
        }
        let error = Dp5Error::Session {
            session_id: self.session_id.clone(),
            message,
        };
        error!("{error}");
        handler.on_transport_error(&self.session_id, &error);
        set_state(&self.state_tx, ConnectionState::Degraded);
    }

    /// Whether a MESSAGE frame belongs to our topic subscription.
    fn is_subscribed(&self, frame: &StompFrame) -> bool {
        match frame.headers.get("subscription") {
            Some(id) => id == SUBSCRIPTION_ID,
            None => frame.headers.get("destination") == Some(self.topic.as_str()),
        }
    }

    fn handle_frame<H: NotificationHandler>(&self, handler: &H, frame: StompFrame) {
        if self.closing() {
            debug!("dropping {} frame received after close", frame.command);
            return;
        }
        match frame.command {
            StompCommand::Message if self.is_subscribed(&frame) => {
                match NotificationEvent::from_frame(&frame.headers, &frame.body) {
                    Ok(Some(event)) => {
                        debug!("{} notification received", event.notification_type);
                        handler.on_notification(event);
                    }
                    Ok(None) => debug!("dropping unrecognized notification on {}", self.topic),
                    Err(e) => warn!("skipping undecodable notification: {e}"),
                }
            }
            StompCommand::Receipt => {
                debug!(
                    "receipt {} acknowledged",
                    frame.headers.get("receipt-id").unwrap_or("?")
                );
            }
            _ => handler.on_session_frame(SessionFrame::from_frame(&frame)),
        }
    }
}

/// Read loop: classifies inbound frames until the session ends or faults.
async fn run_read_loop<H: NotificationHandler>(mut ws_read: WsRead, handler: H, ctx: ReadContext) {
    loop {
        let next = match ctx.read_deadline {
            Some(limit) => match tokio::time::timeout(limit, ws_read.next()).await {
                Ok(next) => next,
                Err(_) => {
                    ctx.fail(
                        &handler,
                        format!("no data from server for {}ms", limit.as_millis()),
                    );
                    return;
                }
            },
            None => ws_read.next().await,
        };

        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                ctx.fail(&handler, format!("socket failure: {e}"));
                return;
            }
            None => {
                ctx.fail(&handler, "connection dropped".to_string());
                return;
            }
        };

        let text = match msg {
            Message::Text(t) => t.as_str().to_owned(),
            Message::Binary(b) => match String::from_utf8(b.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    ctx.fail(&handler, "protocol violation: binary frame is not UTF-8".into());
                    return;
                }
            },
            Message::Close(_) => {
                ctx.fail(&handler, "server closed the session".to_string());
                return;
            }
            _ => continue,
        };

        let frames = match stomp::parse_frames(&text) {
            Ok(frames) => frames,
            Err(e) => {
                ctx.fail(&handler, format!("protocol violation: {e}"));
                return;
            }
        };
        for frame in frames {
            ctx.handle_frame(&handler, frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventDispatcher, SubscriberEvent};

    fn context() -> ReadContext {
        let (state_tx, _) = watch::channel(ConnectionState::Connected);
        ReadContext {
            session_id: "sess-1".into(),
            topic: "/topic/events".into(),
            read_deadline: None,
            state_tx: Arc::new(state_tx),
        }
    }

    fn message(subscription: &str, body: &str) -> StompFrame {
        StompFrame::new(StompCommand::Message)
            .header("destination", "/topic/events")
            .header("subscription", subscription)
            .with_body(body)
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("ws://lab-pc:8777/dp5-websocket"), "lab-pc");
        assert_eq!(host_of("not a url"), "localhost");
    }

    #[tokio::test]
    async fn test_handle_frame_routes_by_kind() {
        let ctx = context();
        let dispatcher = EventDispatcher::new(16);
        let mut rx = dispatcher.subscribe();

        ctx.handle_frame(
            &dispatcher,
            message(SUBSCRIPTION_ID, r#"{"notificationType":"UNKNOWN_TYPE"}"#),
        );
        ctx.handle_frame(&dispatcher, message(SUBSCRIPTION_ID, "{broken"));
        ctx.handle_frame(
            &dispatcher,
            StompFrame::new(StompCommand::Receipt).header("receipt-id", "subscribe-sub-0"),
        );
        ctx.handle_frame(
            &dispatcher,
            message("sub-9", r#"{"notificationType":"SCAN_MILESTONE"}"#),
        );
        ctx.handle_frame(
            &dispatcher,
            message(SUBSCRIPTION_ID, r#"{"notificationType":"SCAN_MILESTONE","progress":50}"#),
        );

        match rx.recv().await.unwrap() {
            SubscriberEvent::SessionFrame(frame) => {
                assert_eq!(frame.command, StompCommand::Message);
                assert_eq!(frame.headers["subscription"], vec!["sub-9".to_string()]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            SubscriberEvent::Notification(event) => assert_eq!(event.payload["progress"], 50),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fail_degrades_once_and_not_after_close() {
        let ctx = context();
        let dispatcher = EventDispatcher::new(16);
        let mut rx = dispatcher.subscribe();

        ctx.fail(&dispatcher, "socket failure: reset".into());
        assert_eq!(*ctx.state_tx.borrow(), ConnectionState::Degraded);
        match rx.recv().await.unwrap() {
            SubscriberEvent::TransportError {
                session_id,
                message,
            } => {
                assert_eq!(session_id, "sess-1");
                assert!(message.contains("reset"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        ctx.state_tx.send_replace(ConnectionState::Disconnected);
        ctx.fail(&dispatcher, "connection dropped".into());
        assert_eq!(*ctx.state_tx.borrow(), ConnectionState::Disconnected);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_dispatch_once_closing() {
        let ctx = context();
        let dispatcher = EventDispatcher::new(16);
        let mut rx = dispatcher.subscribe();

        ctx.state_tx.send_replace(ConnectionState::Disconnected);
        ctx.handle_frame(
            &dispatcher,
            message(SUBSCRIPTION_ID, r#"{"notificationType":"SCAN_MILESTONE"}"#),
        );
        ctx.handle_frame(
            &dispatcher,
            StompFrame::new(StompCommand::Error).header("message", "late"),
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_message_without_subscription_header_matches_topic() {
        let ctx = context();
        let frame = StompFrame::new(StompCommand::Message).header("destination", "/topic/events");
        assert!(ctx.is_subscribed(&frame));
        let other = StompFrame::new(StompCommand::Message).header("destination", "/topic/other");
        assert!(!ctx.is_subscribed(&other));
    }
}
