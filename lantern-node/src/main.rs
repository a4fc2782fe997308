//! Lantern node entry point.
//!
//! ```text
//! lantern-node                   Run in the foreground
//! lantern-node --config <path>   Load a custom config TOML
//! lantern-node --gen-config      Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lantern_node::config::NodeConfig;
use lantern_node::service::NodeService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lantern-node", about = "Headless Lantern LAN node")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "lantern-node.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&NodeConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config.
    let config = NodeConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("lantern-node v{}", env!("CARGO_PKG_VERSION"));
    info!("display name: {}", config.resolved_name());
    info!("discovery port: {}", config.network.discovery_port);
    info!("download dir: {}", config.storage.download_dir.display());
    info!("type /help for console commands");

    let service = NodeService::new(config);
    let stop = service.stop_handle();

    // Ctrl-C handler.
    let stop_clone = stop.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop_clone.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    service.run().await?;

    Ok(())
}
