//! SDK-wide constants.

/// SDK name, used for directories and log file names.
pub const APP_NAME: &str = "dp5-remote";

/// SDK version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Path prefix every REST action is appended to.
pub const REMOTE_STUB: &str = "/dp5/remote/v1";

/// Default server host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8777;

/// Default per-verb request timeout in seconds.
pub const DEFAULT_ACTION_TIMEOUT_SECS: u64 = 10;

/// The only status code treated as success.
pub const SUCCESS_STATUS: u16 = 200;

/// WebSocket endpoint path for push notifications.
pub const NOTIFICATION_PATH: &str = "dp5-websocket";

/// Topic the notification subscriber attaches to.
pub const EVENTS_TOPIC: &str = "/topic/events";

/// Payload field naming the notification type.
pub const NOTIFICATION_TYPE_FIELD: &str = "notificationType";

/// Default STOMP heart-beat interval in milliseconds.
pub const DEFAULT_HEARTBEAT_MS: u64 = 10_000;

/// REST action paths exposed by the server.
pub mod actions {
    pub const SYSTEM_VERSION: &str = "/system/version";
    pub const SYSTEM_STATUS: &str = "/system/status";
    pub const SYSTEM_SHUTDOWN: &str = "/system/shutdown";
    pub const LICENCE: &str = "/licence";
    pub const SCAN: &str = "/scan";
    pub const CONTAINERS: &str = "/containers";
}

/// Query parameter names accepted by `/scan`.
pub mod scan_params {
    pub const CONTAINER_UID: &str = "container_uid";
    pub const RAW_IMAGE: &str = "raw_image";
}
