use anyhow::Context;
use clap::Parser;
use lighthouse_exporter::{
    install_telemetry, server, setup_logging, AppState, AuditSession, ChromiumLauncher, Cli,
    Config, LighthouseCli, Metrics,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Cli::parse();

    // Setup logging
    setup_logging(args.verbose).map_err(|e| anyhow::anyhow!("failed to set up logging: {}", e))?;

    info!("Starting lighthouse-exporter v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args).await?;

    // The recorder must exist before metric handles are registered
    install_telemetry(&config)?;
    let metrics = Arc::new(Metrics::new());

    let session = AuditSession::new(
        Arc::new(ChromiumLauncher::new(config.clone())),
        Arc::new(LighthouseCli::new(&config)),
    )
    .with_timeout(config.probe_timeout);

    // Setup graceful shutdown
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let _shutdown_handler = setup_shutdown_handler(shutdown_tx);

    let result = server::run(&config, AppState::new(session, metrics), shutdown_rx).await;

    if let Err(e) = &result {
        error!("Exporter error: {:#}", e);
    }

    info!("lighthouse-exporter stopped");
    result
}

async fn load_config(args: &Cli) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::default(),
    };

    args.apply_to(&mut config);
    config.validate().context("invalid configuration")?;

    info!("Configuration loaded successfully");
    info!("Probe endpoint: {}", config.listen_address());
    info!("Lighthouse: {}", config.lighthouse_path);
    info!("Probe timeout: {:?}", config.probe_timeout);

    Ok(config)
}

fn setup_shutdown_handler(
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .expect("Failed to create SIGINT handler");
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to create SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }

        let _ = shutdown_tx.send(());
    })
}
