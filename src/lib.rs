//! # Lighthouse Exporter
//!
//! A Prometheus exporter that runs a Lighthouse audit against a caller-supplied
//! URL on every scrape and answers with the scores and timings as metric text.
//!
//! ## How a probe works
//!
//! 1. The request passes the process-wide [`Gate`]; probes run one at a time,
//!    in arrival order.
//! 2. A fresh headless Chrome is launched with a throwaway profile.
//! 3. The Lighthouse CLI audits the target through Chrome's debugging port.
//! 4. The report is rendered as exposition lines and Chrome is closed,
//!    whether or not the audit succeeded.
//!
//! ## Endpoint
//!
//! ```text
//! GET /probe?target=https://example.com&mode=desktop&tag=ci
//!
//! # HELP lighthouse_exporter_info Exporter Info
//! # TYPE lighthouse_exporter_info gauge
//! lighthouse_exporter_info{version="0.3.0",chrome_version="HeadlessChrome/126.0.6478.126",mode="desktop",tag="ci",host="example.com",uri="/",lighthouse_version="12.1.0"} 1
//! # HELP lighthouse_score The Score per Category
//! # TYPE lighthouse_score gauge
//! lighthouse_score{category="performance",mode="desktop",tag="ci",host="example.com",uri="/"} 87
//! # HELP lighthouse_timings Audit timings in ms
//! # TYPE lighthouse_timings gauge
//! lighthouse_timings{audit="first-contentful-paint",mode="desktop",tag="ci",host="example.com",uri="/"} 812
//! ```
//!
//! A failed audit still answers `200`, with only the info family; a browser
//! that could not be started gives an empty body. Any other path is a `404`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lighthouse_exporter::{AuditSession, ChromiumLauncher, Config, LighthouseCli, ProbeRequest};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::default();
//!     let session = AuditSession::new(
//!         Arc::new(ChromiumLauncher::new(config.clone())),
//!         Arc::new(LighthouseCli::new(&config)),
//!     );
//!
//!     let request = ProbeRequest::from_query(Some("target=https://example.com"));
//!     let outcome = session.run(&request).await;
//!     print!("{}", outcome.render(&request));
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! lighthouse-exporter -p 9593 --timeout 120 --telemetry-port 9594
//! ```

/// Configuration and settings for the exporter
pub mod config;

/// Error types and error handling utilities
pub mod error;

/// Scrape request parsing
pub mod probe;

/// Process-wide probe serialization
pub mod gate;

/// Headless Chrome lifecycle
pub mod browser;

/// Audit engine seam and the Lighthouse CLI
pub mod audit;

/// One probe from launch to close
pub mod session;

/// Prometheus text rendering
pub mod exposition;

/// HTTP server and routing
pub mod server;

/// Command-line interface implementation
pub mod cli;

/// The exporter's own operational metrics
pub mod metrics;


pub use audit::*;
pub use browser::*;
pub use cli::*;
pub use config::*;
pub use error::*;
pub use exposition::ExporterInfo;
pub use gate::*;
pub use self::metrics::*;
pub use probe::*;
pub use server::{build_router, AppState};
pub use session::*;
