use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Browser error: {0}")]
    BrowserError(String),

    #[error("Audit failed: {0}")]
    AuditFailed(String),

    #[error("Invalid audit report: {0}")]
    InvalidAuditReport(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Malformed target: {0}")]
    MalformedTarget(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl ProbeError {
    /// Failures raised by the audit engine itself, as opposed to the browser
    /// or the exporter plumbing around it.
    pub fn is_audit_failure(&self) -> bool {
        matches!(
            self,
            ProbeError::AuditFailed(_) | ProbeError::InvalidAuditReport(_)
        )
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ProbeError::MalformedTarget(_) => ErrorSeverity::Low,
            ProbeError::AuditFailed(_) | ProbeError::InvalidAuditReport(_) => ErrorSeverity::Medium,
            ProbeError::Timeout(_) => ErrorSeverity::Medium,
            ProbeError::BrowserLaunchFailed(_) => ErrorSeverity::High,
            ProbeError::ConfigurationError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl From<std::io::Error> for ProbeError {
    fn from(err: std::io::Error) -> Self {
        ProbeError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ProbeError {
    fn from(err: serde_json::Error) -> Self {
        ProbeError::InvalidAuditReport(err.to_string())
    }
}
