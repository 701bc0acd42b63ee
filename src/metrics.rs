//! The exporter's own operational metrics
//!
//! These are recorded through the `metrics` facade and only become visible
//! when `install_telemetry` has been called with a telemetry port. They are
//! never mixed into `/probe` responses.

use crate::{Config, ProbeOutcome};
use metrics::{Counter, Gauge, Histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};

pub const PROBES_TOTAL: &str = "lighthouse_exporter_probes_total";
pub const PROBE_DURATION: &str = "lighthouse_exporter_probe_duration_seconds";
pub const GATE_WAITING: &str = "lighthouse_exporter_gate_waiting";

pub struct Metrics {
    pub probes_scored: Counter,
    pub probes_audit_failed: Counter,
    pub probes_aborted: Counter,
    pub probe_duration: Histogram,
    pub gate_waiting: Gauge,
}

impl Metrics {
    /// Register handles with whichever recorder is installed, or no-ops when
    /// none is.
    pub fn new() -> Self {
        Self {
            probes_scored: metrics::register_counter!(PROBES_TOTAL, "outcome" => "scored"),
            probes_audit_failed: metrics::register_counter!(PROBES_TOTAL, "outcome" => "audit_failed"),
            probes_aborted: metrics::register_counter!(PROBES_TOTAL, "outcome" => "aborted"),
            probe_duration: metrics::register_histogram!(PROBE_DURATION),
            gate_waiting: metrics::register_gauge!(GATE_WAITING),
        }
    }

    pub fn noop() -> Self {
        Self {
            probes_scored: Counter::noop(),
            probes_audit_failed: Counter::noop(),
            probes_aborted: Counter::noop(),
            probe_duration: Histogram::noop(),
            gate_waiting: Gauge::noop(),
        }
    }

    pub fn record_probe(&self, outcome: &ProbeOutcome, duration: Duration) {
        match outcome {
            ProbeOutcome::Scored { .. } => self.probes_scored.increment(1),
            ProbeOutcome::AuditFailed { .. } => self.probes_audit_failed.increment(1),
            ProbeOutcome::Aborted(_) => self.probes_aborted.increment(1),
        }

        self.probe_duration.record(duration.as_secs_f64());
    }

    pub fn set_gate_waiting(&self, waiting: usize) {
        self.gate_waiting.set(waiting as f64);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn describe_all() {
    metrics::describe_counter!(PROBES_TOTAL, "Probes served, by outcome");
    metrics::describe_histogram!(
        PROBE_DURATION,
        metrics::Unit::Seconds,
        "Wall time of one probe from browser launch to close"
    );
    metrics::describe_gauge!(GATE_WAITING, "Requests waiting for the probe gate");
}

/// Install the global Prometheus recorder and its HTTP listener.
///
/// Returns `Ok(false)` without touching the recorder when no telemetry port
/// is configured. Must be called before `Metrics::new` for the handles to be
/// recorded.
pub fn install_telemetry(config: &Config) -> anyhow::Result<bool> {
    let Some(port) = config.telemetry_port else {
        return Ok(false);
    };

    let addr: SocketAddr = format!("{}:{}", config.bind_address, port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid telemetry listen address: {}", e))?;

    if addr.ip().is_unspecified() {
        warn!(listen_addr = %addr, "Telemetry endpoint is exposed on all interfaces");
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    describe_all();
    info!(listen_addr = %addr, "Telemetry endpoint active");

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProbeError;

    #[test]
    fn test_noop_metrics_accept_records() {
        let metrics = Metrics::noop();
        metrics.record_probe(
            &ProbeOutcome::Aborted(ProbeError::BrowserLaunchFailed("no chrome".to_string())),
            Duration::from_millis(20),
        );
        metrics.set_gate_waiting(3);
    }

    #[test]
    fn test_telemetry_disabled_without_port() {
        let installed = install_telemetry(&Config::default()).unwrap();
        assert!(!installed);
    }

    #[test]
    fn test_telemetry_rejects_bad_address() {
        let config = Config {
            bind_address: "not an address".to_string(),
            telemetry_port: Some(9594),
            ..Default::default()
        };
        assert!(install_telemetry(&config).is_err());
    }
}
