//! Supervisor configuration loaded from JSON

use crate::dispatch::EntryPoint;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Recognized supervisor options
///
/// Every key is optional; missing keys take the defaults below.
///
/// ```json
/// { "watchPath": "game", "scanIntervalSeconds": 0.25, "quietMode": true }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SupervisorConfig {
    /// Root directory to scan
    pub watch_path: PathBuf,
    /// Minimum time between scans
    pub scan_interval_seconds: f64,
    /// Intercept failures at all
    pub protected_mode: bool,
    /// Log a failed swap instead of entering the error state
    pub quiet_mode: bool,
    /// Tracked module file extension, without the dot
    pub extension: String,
    /// Entry points routed through the protected dispatcher
    pub entry_points: Vec<EntryPoint>,
    /// Module whose same-named functions are bound to the entry points
    pub entry_module: Option<String>,
    /// Key that quits the host while in the error state
    pub quit_key: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            watch_path: PathBuf::from("."),
            scan_interval_seconds: 0.5,
            protected_mode: true,
            quiet_mode: false,
            extension: "mod".to_string(),
            entry_points: EntryPoint::ALL.to_vec(),
            entry_module: Some("main".to_string()),
            quit_key: "escape".to_string(),
        }
    }
}

impl SupervisorConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::ConfigError(format!("invalid supervisor config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.scan_interval_seconds.is_finite() || self.scan_interval_seconds < 0.0 {
            return Err(Error::ConfigError(format!(
                "scanIntervalSeconds must be a non-negative number, got {}",
                self.scan_interval_seconds
            )));
        }
        let extension = self.extension.trim_start_matches('.');
        if extension.is_empty() {
            return Err(Error::ConfigError("extension must not be empty".to_string()));
        }
        if self.quit_key.is_empty() {
            return Err(Error::ConfigError("quitKey must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs_f64(self.scan_interval_seconds.max(0.0))
    }

    /// Extension with any leading dot removed
    pub fn normalized_extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }
}
