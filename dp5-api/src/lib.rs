//! DP5 API - HTTP client for the DP5 remote REST API.
//!
//! This crate provides the action-level client for a locally running DP5
//! service. Each remote action is built as a fresh [`ActionRequest`] with a
//! per-verb timeout, sent once, checked for a 200 status and only then decoded
//! into a JSON document or a named field of one.

pub mod client;
pub mod endpoints;
pub mod request;
pub mod response;

// Re-export key types
pub use client::RemoteClient;
pub use endpoints::scan::ScanOptions;
pub use request::{ActionRequest, ActionRequestBuilder, QueryParams, VerbTimeouts};
pub use response::{Document, DocumentExt};
