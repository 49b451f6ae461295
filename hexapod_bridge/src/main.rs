use clap::Parser;
use hexapod_bridge::config;
use hexapod_bridge::hardware::serial_linux::SystemSerial;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "hexapod-bridge", about = "Relays operator commands to the hexapod motor controller")]
struct Cli {
    /// Bridge configuration file (TOML)
    #[arg(short, long, default_value = "bridge.toml")]
    config: String,
    /// Serial device to try instead of the configured candidates; repeatable
    #[arg(long = "serial")]
    serial: Vec<String>,
    /// Calibration file (JSON), overriding the configured path
    #[arg(long)]
    calibration: Option<String>,
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .init();

    tracing::info!("Starting hexapod bridge");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loading configuration from: {}", cli.config);

    let mut config = match config::load_or_default(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load config from '{}': {}", cli.config, e);
            return ExitCode::FAILURE;
        }
    };
    if !cli.serial.is_empty() {
        config.serial.candidates = cli.serial;
    }
    if let Some(path) = cli.calibration {
        config.calibration_file = path;
    }

    let (mut service, channel) = match hexapod_bridge::start(&config, Arc::new(SystemSerial)).await {
        Ok(started) => started,
        Err(e) => {
            tracing::error!("Bridge startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    service
        .run(&channel, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Cannot listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    tracing::info!("Bridge stopped");
    ExitCode::SUCCESS
}
