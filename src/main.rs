use anyhow::{Context, Result};
use env_logger::Env;
use log::{info, warn};
use tokio::sync::watch;

use smartdisplay_monitor::cli;
use smartdisplay_monitor::{
    Config, ConfigError, Dht11Sensor, ModbusClient, MonitorService, VERSION,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = match cli::parse_args(std::env::args()).and_then(|m| Config::from_matches(&m)) {
        Ok(config) => config,
        Err(ConfigError::Usage(message)) => {
            println!("{}", message);
            std::process::exit(2);
        }
        Err(e) => return Err(e.into()),
    };

    info!("🖥️  SmartDisplay monitor v{}", VERSION);

    let client = ModbusClient::open(&config)
        .with_context(|| format!("Failed to open serial session on {}", config.serial_port))?;
    let sensor = Dht11Sensor::open(config.sensor_device.as_deref())?;
    let mut service = MonitorService::new(&config, Box::new(sensor), Box::new(client))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("🛑 Ctrl+C received, stopping monitor");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!("⚠️  Ctrl+C handler unavailable: {}", e);
                // Keep the sender alive so the loop is not cancelled
                std::future::pending::<()>().await;
            }
        }
    });

    let summary = service.run(shutdown_rx).await?;
    info!(
        "👋 Goodbye! {} cycles, {} published, {} skipped",
        summary.cycles, summary.published, summary.skipped
    );
    Ok(())
}
