//! Container endpoints.

use dp5_core::constants::actions;
use dp5_core::error::{Dp5Error, Dp5Result};

use crate::client::RemoteClient;
use crate::response::{self, Document};

impl RemoteClient {
    /// List every container definition known to the server.
    pub async fn list_containers(&self) -> Dp5Result<Vec<Document>> {
        let body = self.get(actions::CONTAINERS, None).await?;
        response::parse_array(&body)
    }

    /// Delete one container by its identifier.
    pub async fn delete_container(&self, id: &str) -> Dp5Result<()> {
        let action = container_path(id)?;
        self.delete(&action).await?;
        Ok(())
    }
}

/// Action path for a single container. The id must be one path segment.
pub(crate) fn container_path(id: &str) -> Dp5Result<String> {
    if id.is_empty() {
        return Err(Dp5Error::MalformedRequest("empty container id".into()));
    }
    if id
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '?' | '#'))
    {
        return Err(Dp5Error::MalformedRequest(format!(
            "container id is not a single path segment: {id:?}"
        )));
    }
    Ok(format!("{}/{id}", actions::CONTAINERS))
}
