//! failover-proxy command line.
//!
//! ```text
//! failover-proxy --config cluster.toml check
//! failover-proxy --config cluster.toml watch --interval-ms 500
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use failover_proxy::config::loader::load_config;
use failover_proxy::driver::credentials::provider_from_config;
use failover_proxy::driver::tcp::TcpDriver;
use failover_proxy::driver::CredentialsProvider;
use failover_proxy::observability::{init_logging, init_metrics};
use failover_proxy::topology::StaticHostListProvider;
use failover_proxy::{FailoverProxy, ProxyConfig};

#[derive(Parser)]
#[command(name = "failover-proxy")]
#[command(about = "Health monitoring and failover for database connections", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "failover-proxy.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and print the resolved settings
    Check,
    /// Connect to the writer and ping it until Ctrl+C, failing over as needed
    Watch {
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_logging(&config.observability);

    match cli.command {
        Commands::Check => {
            println!("{}", serde_json::to_string_pretty(&redacted(&config))?);
        }
        Commands::Watch { interval_ms } => watch(config, Duration::from_millis(interval_ms)).await?,
    }
    Ok(())
}

fn redacted(config: &ProxyConfig) -> ProxyConfig {
    let mut config = config.clone();
    if config.credentials.password.is_some() {
        config.credentials.password = Some("<redacted>".to_string());
    }
    config
}

async fn watch(config: ProxyConfig, interval: Duration) -> Result<(), Box<dyn std::error::Error>> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let topology = Arc::new(StaticHostListProvider::from_config(&config.cluster)?);
    let writer = topology
        .writer()
        .cloned()
        .ok_or("cluster has no writer")?;
    let credentials: Arc<dyn CredentialsProvider> = Arc::from(provider_from_config(&config.credentials));
    let proxy = FailoverProxy::new(&config, topology, Arc::new(TcpDriver::new()), credentials)?;

    tracing::info!(
        writer = %writer,
        detection_interval_ms = proxy.monitor_settings().failure_detection_interval.as_millis() as u64,
        detection_count = proxy.monitor_settings().failure_detection_count,
        "failover-proxy v0.1.0 watching"
    );
    let connection = proxy.connect(&writer).await?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                match connection.ping().await {
                    Ok(_) => tracing::debug!(host = %connection.current_host(), "Ping ok"),
                    Err(e) => tracing::warn!(host = %connection.current_host(), error = %e, "Ping failed"),
                }
                if let Some(event) = connection.take_failover() {
                    tracing::info!(
                        from = %event.from,
                        to = %event.to,
                        attempts = event.attempts,
                        duration_ms = event.duration.as_millis() as u64,
                        "Connection failed over"
                    );
                }
            }
        }
    }

    tracing::info!("Shutting down");
    connection.close().await;
    proxy.shutdown();
    Ok(())
}
