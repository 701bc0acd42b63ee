//! Page audit engine seam
//!
//! The exporter treats the audit engine as an opaque async function from a
//! target URL and a browser debugging port to an `AuditResult`. The shipped
//! implementation shells out to the Lighthouse CLI and parses its JSON
//! report.

use crate::{Config, Mode, ProbeError};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Timing audits exported in the `lighthouse_timings` family
///
/// Declaration order is the order the samples are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimingAudit {
    FirstContentfulPaint,
    FirstMeaningfulPaint,
    SpeedIndex,
    Interactive,
    TotalBlockingTime,
    MaxPotentialFid,
    ServerResponseTime,
    BootupTime,
    LargestContentfulPaint,
    /// Unitless layout shift ratio, unlike the millisecond timings.
    CumulativeLayoutShift,
}

impl TimingAudit {
    pub const ALL: [TimingAudit; 10] = [
        TimingAudit::FirstContentfulPaint,
        TimingAudit::FirstMeaningfulPaint,
        TimingAudit::SpeedIndex,
        TimingAudit::Interactive,
        TimingAudit::TotalBlockingTime,
        TimingAudit::MaxPotentialFid,
        TimingAudit::ServerResponseTime,
        TimingAudit::BootupTime,
        TimingAudit::LargestContentfulPaint,
        TimingAudit::CumulativeLayoutShift,
    ];

    /// Audit id as it appears in the Lighthouse report.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimingAudit::FirstContentfulPaint => "first-contentful-paint",
            TimingAudit::FirstMeaningfulPaint => "first-meaningful-paint",
            TimingAudit::SpeedIndex => "speed-index",
            TimingAudit::Interactive => "interactive",
            TimingAudit::TotalBlockingTime => "total-blocking-time",
            TimingAudit::MaxPotentialFid => "max-potential-fid",
            TimingAudit::ServerResponseTime => "server-response-time",
            TimingAudit::BootupTime => "bootup-time",
            TimingAudit::LargestContentfulPaint => "largest-contentful-paint",
            TimingAudit::CumulativeLayoutShift => "cumulative-layout-shift",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|audit| audit.as_str() == id)
    }
}

impl fmt::Display for TimingAudit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scores and timings of one audit run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditResult {
    /// Category id to score in `[0, 1]`.
    pub categories: BTreeMap<String, f64>,
    /// Raw numeric value per timing audit, before rounding.
    pub timings: BTreeMap<TimingAudit, f64>,
}

impl AuditResult {
    /// Extract the exported values from a Lighthouse JSON report (the `lhr`).
    pub fn from_lighthouse_json(report: &str) -> Result<Self, ProbeError> {
        let report: LighthouseReport = serde_json::from_str(report)?;

        if let Some(runtime_error) = &report.runtime_error {
            warn!(
                code = runtime_error.code.as_deref().unwrap_or("unknown"),
                message = runtime_error.message.as_deref().unwrap_or(""),
                "Lighthouse reported a runtime error"
            );
        }

        let categories = report
            .categories
            .into_iter()
            .map(|(id, category)| (id, category.score.unwrap_or(0.0)))
            .collect();

        let timings = TimingAudit::ALL
            .into_iter()
            .filter_map(|audit| {
                report
                    .audits
                    .get(audit.as_str())
                    .and_then(|entry| entry.numeric_value)
                    .map(|value| (audit, value))
            })
            .collect();

        Ok(Self { categories, timings })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LighthouseReport {
    #[serde(default)]
    categories: BTreeMap<String, ReportCategory>,
    #[serde(default)]
    audits: HashMap<String, ReportAudit>,
    runtime_error: Option<RuntimeError>,
}

#[derive(Debug, Deserialize)]
struct ReportCategory {
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportAudit {
    numeric_value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RuntimeError {
    code: Option<String>,
    message: Option<String>,
}

/// Parameters the engine needs to audit through an already running browser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditOptions {
    /// Chrome remote debugging port the engine attaches to.
    pub debugging_port: u16,
    pub mode: Mode,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditEngine: Send + Sync + 'static {
    /// Run one audit of `target` through the browser behind `options`.
    async fn audit(&self, target: &str, options: &AuditOptions) -> Result<AuditResult, ProbeError>;

    /// Engine version reported in the exporter info sample.
    async fn version(&self) -> Option<String>;
}

/// Audit engine backed by the `lighthouse` command-line tool
pub struct LighthouseCli {
    program: String,
    version: OnceCell<Option<String>>,
}

impl LighthouseCli {
    pub fn new(config: &Config) -> Self {
        Self {
            program: config.lighthouse_path.clone(),
            version: OnceCell::new(),
        }
    }

    /// Command-line arguments for one audit run.
    pub fn build_args(target: &str, options: &AuditOptions) -> Vec<String> {
        let mut args = vec![
            target.to_string(),
            format!("--port={}", options.debugging_port),
            "--output=json".to_string(),
            "--output-path=stdout".to_string(),
            "--quiet".to_string(),
        ];

        // Lighthouse audits as a mobile device unless told otherwise.
        if options.mode == Mode::Desktop {
            args.push("--preset=desktop".to_string());
        }

        args
    }

    async fn query_version(&self) -> Option<String> {
        let output = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| warn!(program = %self.program, error = %e, "Cannot query Lighthouse version"))
            .ok()?;

        if !output.status.success() {
            return None;
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!version.is_empty()).then_some(version)
    }
}

#[async_trait]
impl AuditEngine for LighthouseCli {
    async fn audit(&self, target: &str, options: &AuditOptions) -> Result<AuditResult, ProbeError> {
        let args = Self::build_args(target, options);
        debug!(program = %self.program, ?args, "Running Lighthouse");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProbeError::AuditFailed(format!("cannot run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
            return Err(ProbeError::AuditFailed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                last_line.trim()
            )));
        }

        AuditResult::from_lighthouse_json(&String::from_utf8_lossy(&output.stdout))
    }

    async fn version(&self) -> Option<String> {
        self.version
            .get_or_init(|| self.query_version())
            .await
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"{
        "lighthouseVersion": "12.1.0",
        "categories": {
            "performance": {"id": "performance", "score": 0.87},
            "seo": {"id": "seo", "score": 1},
            "pwa": {"id": "pwa", "score": null}
        },
        "audits": {
            "first-contentful-paint": {"numericValue": 812.4, "score": 0.9},
            "speed-index": {"numericValue": 1520.6},
            "cumulative-layout-shift": {"numericValue": 0.42},
            "interactive": {"score": null},
            "uses-http2": {"numericValue": 0}
        }
    }"#;

    #[test]
    fn test_timing_audit_ids() {
        for audit in TimingAudit::ALL {
            assert_eq!(TimingAudit::from_id(audit.as_str()), Some(audit));
        }
        assert_eq!(TimingAudit::from_id("uses-http2"), None);
        assert!(TimingAudit::FirstContentfulPaint < TimingAudit::CumulativeLayoutShift);
    }

    #[test]
    fn test_parse_report() {
        let result = AuditResult::from_lighthouse_json(REPORT).unwrap();

        assert_eq!(result.categories.get("performance"), Some(&0.87));
        assert_eq!(result.categories.get("seo"), Some(&1.0));
        assert_eq!(result.categories.get("pwa"), Some(&0.0));

        assert_eq!(result.timings.len(), 3);
        assert_eq!(result.timings.get(&TimingAudit::FirstContentfulPaint), Some(&812.4));
        assert_eq!(result.timings.get(&TimingAudit::CumulativeLayoutShift), Some(&0.42));
        assert!(!result.timings.contains_key(&TimingAudit::Interactive));
    }

    #[test]
    fn test_parse_report_with_runtime_error_still_scores() {
        let report = r#"{
            "runtimeError": {"code": "NO_FCP", "message": "The page did not paint"},
            "categories": {"performance": {"score": null}},
            "audits": {}
        }"#;
        let result = AuditResult::from_lighthouse_json(report).unwrap();
        assert_eq!(result.categories.get("performance"), Some(&0.0));
        assert!(result.timings.is_empty());
    }

    #[test]
    fn test_parse_invalid_report() {
        let err = AuditResult::from_lighthouse_json("Runtime error encountered").unwrap_err();
        assert!(matches!(err, ProbeError::InvalidAuditReport(_)));
    }

    #[test]
    fn test_build_args_by_mode() {
        let mobile = LighthouseCli::build_args(
            "https://example.com",
            &AuditOptions { debugging_port: 41234, mode: Mode::Mobile },
        );
        assert_eq!(mobile[0], "https://example.com");
        assert!(mobile.contains(&"--port=41234".to_string()));
        assert!(mobile.contains(&"--output=json".to_string()));
        assert!(!mobile.iter().any(|a| a.starts_with("--preset")));

        let desktop = LighthouseCli::build_args(
            "https://example.com",
            &AuditOptions { debugging_port: 41234, mode: Mode::Desktop },
        );
        assert!(desktop.contains(&"--preset=desktop".to_string()));
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_audit_failure() {
        let engine = LighthouseCli::new(&Config {
            lighthouse_path: "/nonexistent/lighthouse".to_string(),
            ..Default::default()
        });
        let options = AuditOptions { debugging_port: 9222, mode: Mode::Mobile };

        let err = engine.audit("https://example.com", &options).await.unwrap_err();
        assert!(err.is_audit_failure());
        assert_eq!(engine.version().await, None);
    }
}
