//! Licence endpoint.

use dp5_core::constants::actions;
use dp5_core::error::Dp5Result;

use crate::client::RemoteClient;
use crate::response::Document;

impl RemoteClient {
    /// Get the installed licence as an opaque document.
    pub async fn licence(&self) -> Dp5Result<Document> {
        self.get_document(actions::LICENCE).await
    }
}
