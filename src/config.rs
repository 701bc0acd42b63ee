//! Configuration management with serde serialization/deserialization
//!
//! This module holds the exporter settings and the helpers that turn them
//! into a chromiumoxide `BrowserConfig` for each probe.

use crate::ProbeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default port the probe endpoint listens on.
pub const DEFAULT_PORT: u16 = 9593;

/// Main configuration structure for the exporter
///
/// # Examples
///
/// ```rust
/// use lighthouse_exporter::Config;
///
/// let config = Config {
///     port: 9000,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// TCP port for the probe endpoint (default: 9593)
    pub port: u16,

    /// Address the probe endpoint binds to (default: 0.0.0.0)
    pub bind_address: String,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Lighthouse CLI executable (default: `lighthouse` from PATH)
    pub lighthouse_path: String,

    /// Upper bound on one probe, from browser launch to the end of the audit
    ///
    /// `None` keeps the historical behavior: a hung audit holds the gate
    /// until it finishes.
    pub probe_timeout: Option<Duration>,

    /// Port for the exporter's own operational metrics (default: disabled)
    pub telemetry_port: Option<u16>,

    /// Directory under which throwaway browser profiles are created
    /// (default: the system temp dir)
    pub profile_root: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: "0.0.0.0".to_string(),
            chrome_path: None,
            lighthouse_path: "lighthouse".to_string(),
            probe_timeout: None,
            telemetry_port: None,
            profile_root: None,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub async fn from_file(path: &Path) -> Result<Self, ProbeError> {
        let content = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&content)
            .map_err(|e| ProbeError::ConfigurationError(format!("{}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<(), ProbeError> {
        if self.port == 0 {
            return Err(ProbeError::ConfigurationError(
                "Port must be greater than 0".to_string(),
            ));
        }

        if let Some(timeout) = self.probe_timeout {
            if timeout.is_zero() {
                return Err(ProbeError::ConfigurationError(
                    "Probe timeout must be greater than 0".to_string(),
                ));
            }
        }

        if self.lighthouse_path.trim().is_empty() {
            return Err(ProbeError::ConfigurationError(
                "Lighthouse path must not be empty".to_string(),
            ));
        }

        if self.telemetry_port == Some(self.port) {
            return Err(ProbeError::ConfigurationError(format!(
                "Telemetry port {} collides with the probe port",
                self.port
            )));
        }

        Ok(())
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn profile_root(&self) -> PathBuf {
        self.profile_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Chrome command-line arguments for a probe browser
///
/// chromiumoxide already adds the headless and remote debugging flags;
/// these are the flags the audit needs on top of that.
pub fn get_chrome_args(_config: &Config, profile_dir: &Path) -> Vec<String> {
    vec![
        "--no-sandbox".to_string(),
        "--disable-setuid-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-first-run".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--disable-features=ProcessSingleton".to_string(),
        // Own profile per probe so concurrent exporters never share a Chrome singleton
        format!("--user-data-dir={}", profile_dir.display()),
    ]
}

/// Build the chromiumoxide config for one probe browser.
pub fn create_browser_config(
    config: &Config,
    profile_dir: &Path,
) -> Result<chromiumoxide::browser::BrowserConfig, ProbeError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .new_headless_mode()
        .args(get_chrome_args(config, profile_dir));

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(ProbeError::BrowserLaunchFailed)
}
