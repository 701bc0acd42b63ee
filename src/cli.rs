use crate::Config;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "lighthouse-exporter")]
#[command(about = "Prometheus exporter running Lighthouse audits on demand")]
#[command(version)]
pub struct Cli {
    #[arg(short, long, help = "Port for the probe endpoint")]
    pub port: Option<u16>,

    #[arg(long, help = "Bind address")]
    pub bind: Option<String>,

    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Chrome executable path")]
    pub chrome_path: Option<String>,

    #[arg(long, help = "Lighthouse executable path")]
    pub lighthouse_path: Option<String>,

    #[arg(long, help = "Probe timeout in seconds (default: none)")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Port for the exporter's own metrics")]
    pub telemetry_port: Option<u16>,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,
}

impl Cli {
    /// Override file or default settings with the flags that were given.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = &self.bind {
            config.bind_address = bind.clone();
        }
        if let Some(chrome_path) = &self.chrome_path {
            config.chrome_path = Some(chrome_path.clone());
        }
        if let Some(lighthouse_path) = &self.lighthouse_path {
            config.lighthouse_path = lighthouse_path.clone();
        }
        if let Some(timeout) = self.timeout {
            config.probe_timeout = Some(Duration::from_secs(timeout));
        }
        if let Some(telemetry_port) = self.telemetry_port {
            config.telemetry_port = Some(telemetry_port);
        }
    }
}

pub fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_port_flag() {
        let cli = Cli::try_parse_from(["lighthouse-exporter", "-p", "9700"]).unwrap();
        assert_eq!(cli.port, Some(9700));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "lighthouse-exporter",
            "--bind",
            "127.0.0.1",
            "--lighthouse-path",
            "/opt/lighthouse/cli.js",
            "--timeout",
            "90",
            "--telemetry-port",
            "9594",
        ])
        .unwrap();

        let mut config = Config {
            chrome_path: Some("/usr/bin/chromium".to_string()),
            ..Default::default()
        };
        cli.apply_to(&mut config);

        assert_eq!(config.port, 9593);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.lighthouse_path, "/opt/lighthouse/cli.js");
        assert_eq!(config.probe_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.telemetry_port, Some(9594));
        assert_eq!(config.chrome_path.as_deref(), Some("/usr/bin/chromium"));
    }

    #[test]
    fn test_setup_logging_installs_once() {
        let _ = setup_logging(false);
        assert!(setup_logging(true).is_err());
    }

    #[test]
    fn test_rejects_invalid_port() {
        assert!(Cli::try_parse_from(["lighthouse-exporter", "--port", "70000"]).is_err());
    }
}
