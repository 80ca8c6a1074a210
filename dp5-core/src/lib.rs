//! DP5 Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by the other DP5 crates:
//! - Endpoint configuration (host, port, per-verb timeouts, notification channel)
//! - The unified error type covering request, transport and session failures
//! - Structured logging with tracing
//! - Platform directory helpers
//! - Common constants for the remote API surface

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod platform;

// Re-export commonly used items at the crate root
pub use config::{AppConfig, NotificationConfig, ServerConfig};
pub use error::{Dp5Error, Dp5Result};
pub use logging::init_logging;
pub use platform::Platform;
