//! Scrape request model
//!
//! A `ProbeRequest` is built from the raw query string of a `/probe` call.
//! Parsing never fails: unknown modes fall back to mobile, a missing tag gets
//! the `not set` sentinel, and an unparsable target only blanks the host and
//! uri labels.

use crate::ProbeError;
use std::fmt;
use tracing::warn;
use url::Url;

/// Tag value used when the caller does not supply one.
pub const DEFAULT_TAG: &str = "not set";

/// Simulated device profile for the audit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    #[default]
    Mobile,
    Desktop,
}

impl Mode {
    /// Resolve a query value; anything but an exact `desktop` is mobile.
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("desktop") => Mode::Desktop,
            _ => Mode::Mobile,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Mobile => "mobile",
            Mode::Desktop => "desktop",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub id: String,
    /// Page to audit. Empty when the caller left it out; the audit engine is
    /// expected to reject it.
    pub target: String,
    pub mode: Mode,
    pub tag: String,
    /// Host of `target`, empty when it does not parse.
    pub host: String,
    /// Path of `target`, empty when it does not parse.
    pub uri: String,
}

impl Default for ProbeRequest {
    fn default() -> Self {
        Self::new(String::new(), Mode::default(), None)
    }
}

impl ProbeRequest {
    pub fn new(target: String, mode: Mode, tag: Option<String>) -> Self {
        let (host, uri) = match parse_target(&target) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(url = %target, error = %e, "Target labels unavailable");
                (String::new(), String::new())
            }
        };

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target,
            mode,
            tag: tag.filter(|t| !t.is_empty()).unwrap_or_else(|| DEFAULT_TAG.to_string()),
            host,
            uri,
        }
    }

    /// Build a request from an undecoded query string such as
    /// `target=https%3A%2F%2Fexample.com&mode=desktop&tag=ci`.
    ///
    /// When a key repeats, its first occurrence wins.
    pub fn from_query(query: Option<&str>) -> Self {
        let mut target = None;
        let mut mode = None;
        let mut tag = None;

        for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            let slot = match key.as_ref() {
                "target" => &mut target,
                "mode" => &mut mode,
                "tag" => &mut tag,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        Self::new(
            target.unwrap_or_default(),
            Mode::from_param(mode.as_deref()),
            tag,
        )
    }
}

/// Split a target URL into the host and path used as labels.
pub fn parse_target(target: &str) -> Result<(String, String), ProbeError> {
    let url = Url::parse(target).map_err(|e| ProbeError::MalformedTarget(e.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| ProbeError::MalformedTarget(format!("{target} has no host")))?
        .to_string();
    Ok((host, url.path().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_resolution() {
        assert_eq!(Mode::from_param(Some("desktop")), Mode::Desktop);
        assert_eq!(Mode::from_param(Some("mobile")), Mode::Mobile);
        assert_eq!(Mode::from_param(Some("tablet")), Mode::Mobile);
        assert_eq!(Mode::from_param(Some("Desktop")), Mode::Mobile);
        assert_eq!(Mode::from_param(None), Mode::Mobile);
    }

    #[test]
    fn test_from_query_full() {
        let request = ProbeRequest::from_query(Some(
            "target=https%3A%2F%2Fexample.com%2Fshop%3Fitem%3D1&mode=desktop&tag=ci",
        ));
        assert_eq!(request.target, "https://example.com/shop?item=1");
        assert_eq!(request.mode, Mode::Desktop);
        assert_eq!(request.tag, "ci");
        assert_eq!(request.host, "example.com");
        assert_eq!(request.uri, "/shop");
        assert!(!request.id.is_empty());
    }

    #[test]
    fn test_from_query_defaults() {
        let request = ProbeRequest::from_query(Some("target=https://example.com"));
        assert_eq!(request.mode, Mode::Mobile);
        assert_eq!(request.tag, DEFAULT_TAG);
        assert_eq!(request.uri, "/");

        let empty_tag = ProbeRequest::from_query(Some("target=https://example.com&tag="));
        assert_eq!(empty_tag.tag, DEFAULT_TAG);
    }

    #[test]
    fn test_missing_target_is_not_rejected() {
        let request = ProbeRequest::from_query(None);
        assert_eq!(request.target, "");
        assert_eq!(request.host, "");
        assert_eq!(request.uri, "");
        assert_eq!(request.tag, DEFAULT_TAG);
    }

    #[test]
    fn test_malformed_target_blanks_labels() {
        let request = ProbeRequest::from_query(Some("target=not-a-url&mode=desktop"));
        assert_eq!(request.target, "not-a-url");
        assert_eq!(request.mode, Mode::Desktop);
        assert_eq!(request.host, "");
        assert_eq!(request.uri, "");
    }

    #[test]
    fn test_first_occurrence_wins() {
        let request = ProbeRequest::from_query(Some("mode=desktop&mode=mobile&tag=a&tag=b"));
        assert_eq!(request.mode, Mode::Desktop);
        assert_eq!(request.tag, "a");
    }

    #[test]
    fn test_parse_target_errors() {
        assert!(matches!(parse_target(""), Err(ProbeError::MalformedTarget(_))));
        assert!(matches!(parse_target("mailto:a@b.c"), Err(ProbeError::MalformedTarget(_))));
        assert_eq!(
            parse_target("http://example.com:8080/a/b").unwrap(),
            ("example.com".to_string(), "/a/b".to_string())
        );
    }
}
