//! DP5 Socket - push notification subscriber for the DP5 remote SDK.
//!
//! This crate provides:
//! - A STOMP 1.2 frame codec for the WebSocket notification channel
//! - `NotificationSubscriber`, which connects, subscribes to the event topic
//!   and delivers recognized notifications to a handler
//! - The closed set of notification types and an optional broadcast
//!   dispatcher for fanning events out to several tasks

pub mod events;
pub mod stomp;
pub mod subscriber;

// Re-export key types
pub use events::{
    ConnectionState, EventDispatcher, NotificationEvent, NotificationHandler, NotificationType,
    SessionFrame, SubscriberEvent,
};
pub use stomp::{FrameError, HeartBeat, StompCommand, StompFrame};
pub use subscriber::NotificationSubscriber;
