//! Platform-specific directory helpers.

use std::path::PathBuf;

use crate::constants::APP_NAME;
use crate::error::{Dp5Error, Dp5Result};

/// Detected operating system platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// Detect the current platform at compile time.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Get the platform-specific data directory for the SDK.
    ///
    /// - Windows: `%APPDATA%/dp5-remote`
    /// - macOS: `~/Library/Application Support/dp5-remote`
    /// - Linux: `~/.local/share/dp5-remote`
    pub fn data_dir() -> Dp5Result<PathBuf> {
        let base = dirs::data_dir()
            .ok_or_else(|| Dp5Error::Config("could not determine data directory".into()))?;
        Ok(base.join(APP_NAME))
    }

    /// Get the platform-specific configuration directory for the SDK.
    pub fn config_dir() -> Dp5Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| Dp5Error::Config("could not determine config directory".into()))?;
        Ok(base.join(APP_NAME))
    }
}
