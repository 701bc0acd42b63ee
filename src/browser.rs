//! Headless Chrome lifecycle for a single probe
//!
//! Each probe launches its own browser with a throwaway profile, hands the
//! remote debugging port to the audit engine and tears everything down
//! afterwards. Nothing is pooled: a browser never outlives its probe.

use crate::{create_browser_config, Config, ProbeError};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use url::Url;

/// Starts browsers for probes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserLauncher: Send + Sync + 'static {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, ProbeError>;
}

/// A running browser owned by exactly one probe
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Product string reported by the browser, e.g. `HeadlessChrome/126.0.6478.126`.
    async fn version(&self) -> Result<String, ProbeError>;

    /// Remote debugging port the audit engine should attach to.
    fn debugging_port(&self) -> Option<u16>;

    /// Shut the browser down and release everything it holds.
    async fn close(&mut self) -> Result<(), ProbeError>;
}

/// Launches Chrome through chromiumoxide
pub struct ChromiumLauncher {
    config: Config,
}

impl ChromiumLauncher {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn profile_dir(&self) -> PathBuf {
        self.config.profile_root().join(format!(
            "lighthouse-exporter-{}-{}",
            std::process::id(),
            uuid::Uuid::new_v4()
        ))
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, ProbeError> {
        // Dropping `profile` on any early return, cancellation included, removes it
        let profile = ProfileDir::create(self.profile_dir())?;

        let browser_config = create_browser_config(&self.config, profile.path())?;
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ProbeError::BrowserLaunchFailed(e.to_string()))?;

        // The handler drives the CDP connection and must be polled until the browser exits
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("Handler error: {}", e);
                    break;
                }
            }
            debug!("Handler stream ended");
        });

        let debugging_port = port_from_websocket(browser.websocket_address());
        debug!(
            ws = %browser.websocket_address(),
            profile = %profile.path().display(),
            "Browser launched"
        );

        Ok(Box::new(ChromiumSession {
            browser: Mutex::new(browser),
            handler_task,
            profile,
            debugging_port,
        }))
    }
}

pub struct ChromiumSession {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
    profile: ProfileDir,
    debugging_port: Option<u16>,
}

impl Drop for ChromiumSession {
    // chromiumoxide kills the child when `Browser` drops; the handler task is ours
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn version(&self) -> Result<String, ProbeError> {
        self.browser
            .lock()
            .await
            .version()
            .await
            .map(|version| version.product)
            .map_err(|e| ProbeError::BrowserError(e.to_string()))
    }

    fn debugging_port(&self) -> Option<u16> {
        self.debugging_port
    }

    async fn close(&mut self) -> Result<(), ProbeError> {
        let browser = self.browser.get_mut();
        let closed = browser
            .close()
            .await
            .map_err(|e| ProbeError::BrowserError(e.to_string()));

        // Reap the child even when the CDP close request failed
        if let Err(e) = browser.wait().await {
            warn!("Failed to wait for browser exit: {}", e);
        }
        self.handler_task.abort();
        self.profile.remove().await;

        closed.map(|_| ())
    }
}

/// Extract the port from a DevTools websocket URL such as
/// `ws://127.0.0.1:41234/devtools/browser/<id>`.
pub fn port_from_websocket(address: &str) -> Option<u16> {
    Url::parse(address).ok()?.port_or_known_default()
}

/// Throwaway Chrome profile directory, removed at the latest when dropped
#[derive(Debug)]
struct ProfileDir {
    path: PathBuf,
}

impl ProfileDir {
    // Synchronous so the guard exists before the first await point
    fn create(path: PathBuf) -> Result<Self, ProbeError> {
        std::fs::create_dir_all(&path).map_err(|e| {
            ProbeError::BrowserLaunchFailed(format!("Failed to create profile dir: {}", e))
        })?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn remove(&self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.path).await {
            warn!(profile = %self.path.display(), "Failed to remove browser profile: {}", e);
        }
    }
}

impl Drop for ProfileDir {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!(profile = %self.path.display(), "Failed to remove browser profile: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_port_from_websocket() {
        assert_eq!(
            port_from_websocket("ws://127.0.0.1:41234/devtools/browser/3f1c"),
            Some(41234)
        );
        assert_eq!(port_from_websocket("ws://localhost/devtools/browser/3f1c"), Some(80));
        assert_eq!(port_from_websocket("not a url"), None);
    }

    #[test]
    fn test_profile_dirs_are_unique() {
        let root = std::env::temp_dir().join("lighthouse-exporter-profile-test");
        let launcher = ChromiumLauncher::new(Config {
            profile_root: Some(root.clone()),
            ..Default::default()
        });

        let a = launcher.profile_dir();
        let b = launcher.profile_dir();
        assert_ne!(a, b);
        assert!(a.starts_with(&root));
    }

    #[tokio::test]
    async fn test_launch_failure_cleans_profile() {
        let root = std::env::temp_dir().join(format!("lighthouse-exporter-{}", uuid::Uuid::new_v4()));
        let launcher = ChromiumLauncher::new(Config {
            chrome_path: Some("/nonexistent/chrome".to_string()),
            profile_root: Some(root.clone()),
            ..Default::default()
        });

        let result = launcher.launch().await;
        assert!(matches!(result, Err(ProbeError::BrowserLaunchFailed(_))));

        let mut entries = tokio::fs::read_dir(&root).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[test]
    fn test_profile_dir_removed_on_drop() {
        let path = std::env::temp_dir().join(format!("lighthouse-exporter-{}", uuid::Uuid::new_v4()));
        let profile = ProfileDir::create(path.clone()).unwrap();
        std::fs::write(path.join("Local State"), b"{}").unwrap();
        assert!(path.exists());

        drop(profile);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_cancelled_launch_leaves_no_profile() {
        let root = std::env::temp_dir().join(format!("lighthouse-exporter-{}", uuid::Uuid::new_v4()));
        let launcher = ChromiumLauncher::new(Config {
            chrome_path: Some("/nonexistent/chrome".to_string()),
            profile_root: Some(root.clone()),
            ..Default::default()
        });

        // Dropped at its first suspension point, after the profile dir exists
        let _ = tokio::time::timeout(Duration::ZERO, launcher.launch()).await;

        let mut entries = tokio::fs::read_dir(&root).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    #[ignore] // Requires Chrome/Chromium to be installed
    async fn test_real_browser_lifecycle() {
        let launcher = ChromiumLauncher::new(Config::default());
        let mut session = launcher.launch().await.unwrap();

        let version = session.version().await.unwrap();
        assert!(version.contains("Chrome"));
        assert!(session.debugging_port().is_some());

        session.close().await.unwrap();
    }
}
