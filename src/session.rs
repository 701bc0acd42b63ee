//! One probe from browser launch to browser close
//!
//! `AuditSession::run` never returns an error. Whatever goes wrong is folded
//! into a `ProbeOutcome`, and a browser that launched is always closed before
//! the outcome is handed back.

use crate::exposition::{self, ExporterInfo};
use crate::{AuditEngine, AuditOptions, AuditResult, BrowserLauncher, BrowserSession, ProbeError, ProbeRequest};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Result of one probe, ready to be rendered
#[derive(Debug)]
pub enum ProbeOutcome {
    /// Nothing useful is known; the response body is empty.
    Aborted(ProbeError),
    /// The browser ran but the audit did not produce a report.
    AuditFailed { info: ExporterInfo, error: ProbeError },
    Scored { info: ExporterInfo, result: AuditResult },
}

impl ProbeOutcome {
    pub fn lines(&self, request: &ProbeRequest) -> Vec<String> {
        match self {
            ProbeOutcome::Aborted(_) => Vec::new(),
            ProbeOutcome::AuditFailed { info, .. } => exposition::format(info, None, request),
            ProbeOutcome::Scored { info, result } => exposition::format(info, Some(result), request),
        }
    }

    /// Response body for this outcome.
    pub fn render(&self, request: &ProbeRequest) -> String {
        exposition::render(&self.lines(request))
    }

    /// Value of the `outcome` label in self telemetry.
    pub fn label(&self) -> &'static str {
        match self {
            ProbeOutcome::Aborted(_) => "aborted",
            ProbeOutcome::AuditFailed { .. } => "audit_failed",
            ProbeOutcome::Scored { .. } => "scored",
        }
    }

    /// Value of the `failure` field when the probe is logged as failed.
    ///
    /// Anything that goes wrong once the browser is up, a timeout included,
    /// is charged to Lighthouse.
    pub fn failure_tag(&self) -> Option<&'static str> {
        match self {
            ProbeOutcome::Aborted(_) => Some("generic"),
            ProbeOutcome::AuditFailed { .. } => Some("lighthouse"),
            ProbeOutcome::Scored { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ProbeError> {
        match self {
            ProbeOutcome::Aborted(error) | ProbeOutcome::AuditFailed { error, .. } => Some(error),
            ProbeOutcome::Scored { .. } => None,
        }
    }
}

/// Runs probes against a browser launcher and an audit engine
#[derive(Clone)]
pub struct AuditSession {
    launcher: Arc<dyn BrowserLauncher>,
    engine: Arc<dyn AuditEngine>,
    timeout: Option<Duration>,
}

impl AuditSession {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, engine: Arc<dyn AuditEngine>) -> Self {
        Self {
            launcher,
            engine,
            timeout: None,
        }
    }

    /// Bound launch, version lookup and audit by one shared deadline.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run(&self, request: &ProbeRequest) -> ProbeOutcome {
        let started = Instant::now();
        let deadline = self
            .timeout
            .map(|limit| (tokio::time::Instant::now() + limit, limit));

        info!(
            id = %request.id,
            url = %request.target,
            mode = %request.mode,
            tag = %request.tag,
            "Probe started"
        );

        debug!(id = %request.id, "Launching browser");
        let outcome = match within(deadline, self.launcher.launch()).await {
            Ok(mut browser) => {
                debug!(id = %request.id, "Browser launched");
                let outcome = self.drive(&*browser, request, deadline).await;

                debug!(id = %request.id, "Closing browser");
                if let Err(e) = browser.close().await {
                    warn!(id = %request.id, error = %e, "Failed to close browser");
                }
                debug!(id = %request.id, "Browser closed");
                outcome
            }
            Err(e) => {
                debug!(id = %request.id, "Browser launch failed");
                ProbeOutcome::Aborted(e)
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match (outcome.error(), outcome.failure_tag()) {
            (Some(e), Some(failure)) => error!(
                id = %request.id,
                url = %request.target,
                failure,
                elapsed_ms,
                "Probe failed: {}",
                e
            ),
            _ => info!(
                id = %request.id,
                url = %request.target,
                elapsed_ms,
                "Probe finished"
            ),
        }

        outcome
    }

    async fn drive(
        &self,
        browser: &dyn BrowserSession,
        request: &ProbeRequest,
        deadline: Option<(tokio::time::Instant, Duration)>,
    ) -> ProbeOutcome {
        let versions = async {
            let chrome_version = browser.version().await?;
            let lighthouse_version = self.engine.version().await;
            Ok::<_, ProbeError>(ExporterInfo::new(chrome_version, lighthouse_version))
        };

        let info = match within(deadline, versions).await {
            Ok(info) => info,
            Err(e) => return ProbeOutcome::Aborted(e),
        };

        let Some(debugging_port) = browser.debugging_port() else {
            return ProbeOutcome::AuditFailed {
                info,
                error: ProbeError::BrowserError("browser exposes no debugging port".to_string()),
            };
        };

        let options = AuditOptions {
            debugging_port,
            mode: request.mode,
        };

        debug!(id = %request.id, port = debugging_port, "Auditing");
        match within(deadline, self.engine.audit(&request.target, &options)).await {
            Ok(result) => {
                debug!(
                    id = %request.id,
                    categories = result.categories.len(),
                    timings = result.timings.len(),
                    "Audit scored"
                );
                ProbeOutcome::Scored { info, result }
            }
            Err(error) => {
                debug!(id = %request.id, "Audit failed");
                ProbeOutcome::AuditFailed { info, error }
            }
        }
    }
}

async fn within<T, F>(deadline: Option<(tokio::time::Instant, Duration)>, fut: F) -> Result<T, ProbeError>
where
    F: Future<Output = Result<T, ProbeError>>,
{
    match deadline {
        Some((at, limit)) => tokio::time::timeout_at(at, fut)
            .await
            .map_err(|_| ProbeError::Timeout(limit))?,
        None => fut.await,
    }
}
