//! Prometheus text exposition of one probe
//!
//! Pure functions only: the same info, result and request always produce the
//! same lines in the same order.

use crate::{AuditResult, ProbeRequest};
use std::fmt::Write;

pub const INFO_METRIC: &str = "lighthouse_exporter_info";
pub const SCORE_METRIC: &str = "lighthouse_score";
pub const TIMINGS_METRIC: &str = "lighthouse_timings";

/// Values of the `lighthouse_exporter_info` sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterInfo {
    pub version: String,
    pub chrome_version: String,
    pub lighthouse_version: String,
}

impl ExporterInfo {
    pub fn new(chrome_version: impl Into<String>, lighthouse_version: Option<String>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            chrome_version: chrome_version.into(),
            lighthouse_version: lighthouse_version.unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

/// Render the metric lines for one probe.
///
/// The info family is always present. Score and timing families appear only
/// when `result` carries values for them.
pub fn format(info: &ExporterInfo, result: Option<&AuditResult>, request: &ProbeRequest) -> Vec<String> {
    let mut lines = Vec::new();
    let mode = request.mode.as_str();

    push_header(&mut lines, INFO_METRIC, "Exporter Info");
    lines.push(sample(
        INFO_METRIC,
        &[
            ("version", info.version.as_str()),
            ("chrome_version", info.chrome_version.as_str()),
            ("mode", mode),
            ("tag", request.tag.as_str()),
            ("host", request.host.as_str()),
            ("uri", request.uri.as_str()),
            ("lighthouse_version", info.lighthouse_version.as_str()),
        ],
        1.0,
    ));

    let Some(result) = result else {
        return lines;
    };

    if !result.categories.is_empty() {
        push_header(&mut lines, SCORE_METRIC, "The Score per Category");
        for (category, score) in &result.categories {
            lines.push(sample(
                SCORE_METRIC,
                &[
                    ("category", category.as_str()),
                    ("mode", mode),
                    ("tag", request.tag.as_str()),
                    ("host", request.host.as_str()),
                    ("uri", request.uri.as_str()),
                ],
                (score * 100.0).round(),
            ));
        }
    }

    if !result.timings.is_empty() {
        push_header(&mut lines, TIMINGS_METRIC, "Audit timings in ms");
        for (audit, value) in &result.timings {
            lines.push(sample(
                TIMINGS_METRIC,
                &[
                    ("audit", audit.as_str()),
                    ("mode", mode),
                    ("tag", request.tag.as_str()),
                    ("host", request.host.as_str()),
                    ("uri", request.uri.as_str()),
                ],
                value.round(),
            ));
        }
    }

    lines
}

/// Join lines into a response body. An empty set of lines is an empty body.
pub fn render(lines: &[String]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut body = lines.join("\n");
    body.push('\n');
    body
}

fn push_header(lines: &mut Vec<String>, name: &str, help: &str) {
    lines.push(format!("# HELP {name} {help}"));
    lines.push(format!("# TYPE {name} gauge"));
}

fn sample(name: &str, labels: &[(&str, &str)], value: f64) -> String {
    let mut line = String::with_capacity(128);
    line.push_str(name);
    line.push('{');
    for (i, (key, val)) in labels.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        let _ = write!(line, "{}=\"{}\"", key, escape_label_value(val));
    }
    line.push_str("} ");
    line.push_str(&format_value(value));
    line
}

/// Escape a label value for the text exposition format.
pub fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let sign = if value > 0.0 { "+" } else { "-" };
        format!("{sign}Inf")
    } else if value == 0.0 {
        // -0 renders as "-0" otherwise
        "0".to_string()
    } else {
        value.to_string()
    }
}
