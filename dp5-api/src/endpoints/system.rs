//! System endpoints: version, status and shutdown.

use dp5_core::constants::actions;
use dp5_core::error::Dp5Result;

use crate::client::RemoteClient;

impl RemoteClient {
    /// Get the DP5 version string from `/system/version`.
    pub async fn version(&self) -> Dp5Result<String> {
        self.get_string_field(actions::SYSTEM_VERSION, "version")
            .await
    }

    /// Get the DP5 status string from `/system/status`.
    pub async fn status(&self) -> Dp5Result<String> {
        self.get_string_field(actions::SYSTEM_STATUS, "status").await
    }

    /// Shut down the headless DP5 service.
    pub async fn shutdown(&self) -> Dp5Result<()> {
        self.put(actions::SYSTEM_SHUTDOWN).await?;
        Ok(())
    }
}
