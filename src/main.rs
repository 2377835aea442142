//! HTTP-to-command gateway binary.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use cmd_gateway::config::load_config;
use cmd_gateway::exec::ShellExecutor;
use cmd_gateway::http::GatewayServer;
use cmd_gateway::lifecycle::{signals, Shutdown};
use cmd_gateway::observability;

#[derive(Debug, Parser)]
#[command(name = "cmd-gateway", about = "Maps HTTP requests to command execution")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    observability::init_logging(&config.observability);
    tracing::info!(
        config = %cli.config.display(),
        bind_address = %config.server.bind_address,
        listeners = config.listeners.len(),
        "configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => observability::metrics::init_metrics(addr),
            Err(err) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %err,
                "failed to parse metrics address"
            ),
        }
    }

    let executor = Arc::new(ShellExecutor::new());
    let server = GatewayServer::new(config.clone(), executor)?;
    let registry = server.registry();

    // Plugin lifecycle starts before request serving; any failure is fatal.
    registry.start().await?;

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "listening for connections");

    let shutdown = Shutdown::new();
    let trigger = shutdown.subscribe();
    tokio::spawn({
        let shutdown = shutdown;
        async move {
            signals::shutdown_signal().await;
            shutdown.trigger();
        }
    });

    server.run(listener, trigger).await?;

    registry.stop().await;
    tracing::info!("shutdown complete");
    Ok(())
}
