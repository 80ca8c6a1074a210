//! Notification event types, the handler seam, and the event dispatcher.
//!
//! Frames arriving on the subscribed topic are decoded as JSON documents and
//! classified by their `notificationType` field. Only the closed set of
//! types below is dispatched; everything else is dropped.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use dp5_core::constants::NOTIFICATION_TYPE_FIELD;
use dp5_core::error::Dp5Error;

use crate::stomp::{FrameHeaders, StompCommand, StompFrame};

/// Event types pushed by the DP5 server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    /// A device of the older protocol generation reported in (`DEVICE_LEGACY`).
    DeviceLegacy,
    /// A scanner was attached (`DEVICE_CONNECTED`).
    DeviceConnected,
    /// A scanner was detached (`DEVICE_DISCONNECTED`).
    DeviceDisconnected,
    /// The linear barcode reader came online (`LINEAR_CONNECTED`).
    LinearConnected,
    /// The linear barcode reader went offline (`LINEAR_DISCONNECTED`).
    LinearDisconnected,
    /// The linear reader decoded a barcode (`LINEAR_NEW_BARCODE`).
    LinearNewBarcode,
    LinearPluggedIn,
    LinearUnplugged,
    /// Progress report from a running scan (`SCAN_MILESTONE`).
    ScanMilestone,
    /// Event from the scan activator button (`ACTIVATOR_EVENT`).
    ActivatorEvent,
}

impl NotificationType {
    /// Every recognized type.
    pub const ALL: [NotificationType; 10] = [
        Self::DeviceLegacy,
        Self::DeviceConnected,
        Self::DeviceDisconnected,
        Self::LinearConnected,
        Self::LinearDisconnected,
        Self::LinearNewBarcode,
        Self::LinearPluggedIn,
        Self::LinearUnplugged,
        Self::ScanMilestone,
        Self::ActivatorEvent,
    ];

    /// Parse a wire name. Unrecognized names yield `None`.
    pub fn from_name(s: &str) -> Option<Self> {
        let kind = match s {
            "DEVICE_LEGACY" => Self::DeviceLegacy,
            "DEVICE_CONNECTED" => Self::DeviceConnected,
            "DEVICE_DISCONNECTED" => Self::DeviceDisconnected,
            "LINEAR_CONNECTED" => Self::LinearConnected,
            "LINEAR_DISCONNECTED" => Self::LinearDisconnected,
            "LINEAR_NEW_BARCODE" => Self::LinearNewBarcode,
            "LINEAR_PLUGGED_IN" => Self::LinearPluggedIn,
            "LINEAR_UNPLUGGED" => Self::LinearUnplugged,
            "SCAN_MILESTONE" => Self::ScanMilestone,
            "ACTIVATOR_EVENT" => Self::ActivatorEvent,
            _ => return None,
        };
        Some(kind)
    }

    /// The wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeviceLegacy => "DEVICE_LEGACY",
            Self::DeviceConnected => "DEVICE_CONNECTED",
            Self::DeviceDisconnected => "DEVICE_DISCONNECTED",
            Self::LinearConnected => "LINEAR_CONNECTED",
            Self::LinearDisconnected => "LINEAR_DISCONNECTED",
            Self::LinearNewBarcode => "LINEAR_NEW_BARCODE",
            Self::LinearPluggedIn => "LINEAR_PLUGGED_IN",
            Self::LinearUnplugged => "LINEAR_UNPLUGGED",
            Self::ScanMilestone => "SCAN_MILESTONE",
            Self::ActivatorEvent => "ACTIVATOR_EVENT",
        }
    }

    /// Whether this type concerns the rack scanner itself.
    pub fn is_device_event(&self) -> bool {
        matches!(
            self,
            Self::DeviceLegacy | Self::DeviceConnected | Self::DeviceDisconnected
        )
    }

    /// Whether this type concerns the linear barcode reader.
    pub fn is_linear_event(&self) -> bool {
        matches!(
            self,
            Self::LinearConnected
                | Self::LinearDisconnected
                | Self::LinearNewBarcode
                | Self::LinearPluggedIn
                | Self::LinearUnplugged
        )
    }

    /// Classify a decoded payload by its `notificationType` field.
    pub fn of_payload(payload: &Value) -> Option<Self> {
        payload
            .get(NOTIFICATION_TYPE_FIELD)
            .and_then(Value::as_str)
            .and_then(Self::from_name)
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recognized notification: frame headers plus decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    pub notification_type: NotificationType,
    /// Frame headers; a name may repeat, so values are kept in arrival order.
    pub headers: BTreeMap<String, Vec<String>>,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl NotificationEvent {
    /// Decode a MESSAGE body and classify it.
    ///
    /// Returns `Ok(None)` for valid JSON that is not a recognized
    /// notification, and `Err` when the body is not JSON at all.
    pub fn from_frame(
        headers: &FrameHeaders,
        body: &str,
    ) -> Result<Option<Self>, serde_json::Error> {
        let payload: Value = serde_json::from_str(body)?;
        Ok(NotificationType::of_payload(&payload).map(|notification_type| Self {
            notification_type,
            headers: headers.to_multimap(),
            payload,
            received_at: Utc::now(),
        }))
    }

    /// First value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Try to read a typed view of the payload.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.payload.clone()).ok()
    }
}

/// A session-level frame delivered outside the topic subscription,
/// typically a STOMP ERROR carrying a status code and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFrame {
    pub command: StompCommand,
    /// Numeric status from a `code` header, when present.
    pub code: Option<i32>,
    /// Text from the `message` header, when present.
    pub message: Option<String>,
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: String,
}

impl SessionFrame {
    pub fn from_frame(frame: &StompFrame) -> Self {
        Self {
            command: frame.command,
            code: frame
                .headers
                .get("code")
                .and_then(|c| c.trim().parse().ok()),
            message: frame.headers.get("message").map(str::to_string),
            headers: frame.headers.to_multimap(),
            body: frame.body.clone(),
        }
    }
}

impl fmt::Display for SessionFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        if let Some(code) = self.code {
            write!(f, " [{code}]")?;
        }
        if let Some(message) = &self.message {
            write!(f, " {message}")?;
        }
        Ok(())
    }
}

/// Callbacks invoked from the subscriber's receive loop.
///
/// Calls happen in frame order on the receive task; a slow handler delays
/// every frame behind it, so hand heavy work off to another task.
pub trait NotificationHandler: Send + Sync + 'static {
    /// Called once after the session is established and subscribed.
    fn on_connected(&self, session_id: &str) {
        info!("notification session {session_id} established");
    }

    /// A recognized notification arrived on the topic.
    fn on_notification(&self, event: NotificationEvent);

    /// A session-level frame arrived outside the topic subscription.
    fn on_session_frame(&self, frame: SessionFrame) {
        warn!("session frame: {frame}");
    }

    /// The established session hit a transport or protocol fault.
    fn on_transport_error(&self, session_id: &str, error: &Dp5Error) {
        error!("notification session {session_id} failed: {error}");
    }
}

impl<F> NotificationHandler for F
where
    F: Fn(NotificationEvent) + Send + Sync + 'static,
{
    fn on_notification(&self, event: NotificationEvent) {
        self(event)
    }
}

/// Everything the subscriber reports, as one broadcastable value.
#[derive(Debug, Clone)]
pub enum SubscriberEvent {
    Connected { session_id: String },
    Notification(NotificationEvent),
    SessionFrame(SessionFrame),
    TransportError { session_id: String, message: String },
}

impl SubscriberEvent {
    fn label(&self) -> &str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Notification(event) => event.notification_type.as_str(),
            Self::SessionFrame(_) => "session-frame",
            Self::TransportError { .. } => "transport-error",
        }
    }
}

/// Broadcast-based dispatcher for fanning subscriber events out to tasks.
///
/// Slow receivers that fall behind get `RecvError::Lagged` and miss events
/// rather than stalling the receive loop.
#[derive(Clone)]
pub struct EventDispatcher {
    sender: broadcast::Sender<SubscriberEvent>,
}

impl EventDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SubscriberEvent> {
        self.sender.subscribe()
    }

    /// Dispatch an event to all active receivers.
    pub fn dispatch(&self, event: SubscriberEvent) {
        let label = event.label().to_string();
        match self.sender.send(event) {
            Ok(count) => debug!("dispatched {label} to {count} receiver(s)"),
            Err(_) => debug!("no receivers for {label}"),
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}

impl NotificationHandler for EventDispatcher {
    fn on_connected(&self, session_id: &str) {
        self.dispatch(SubscriberEvent::Connected {
            session_id: session_id.to_string(),
        });
    }

    fn on_notification(&self, event: NotificationEvent) {
        self.dispatch(SubscriberEvent::Notification(event));
    }

    fn on_session_frame(&self, frame: SessionFrame) {
        self.dispatch(SubscriberEvent::SessionFrame(frame));
    }

    fn on_transport_error(&self, session_id: &str, error: &Dp5Error) {
        self.dispatch(SubscriberEvent::TransportError {
            session_id: session_id.to_string(),
            message: error.to_string(),
        });
    }
}

/// Lifecycle state of a notification session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session, or the session was closed.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Subscribed and receiving.
    Connected,
    /// The session faulted. It is not reconnected.
    Degraded,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}
