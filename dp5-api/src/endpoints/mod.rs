//! API endpoint modules organized by category.
//!
//! Each module adds the methods for a group of related remote actions to
//! [`RemoteClient`](crate::client::RemoteClient).

pub mod containers;
pub mod licence;
pub mod scan;
pub mod system;
