use anyhow::Result;
use clap::Parser;
use hikari::{Server, ServerConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Relay for hikari clients", long_about = None)]
struct Args {
    /// Path to the server JSON configuration
    #[arg(short, long, default_value = "hikari-server.json")]
    config: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse args
    let args = Args::parse();

    // Initialize tracing subscriber
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    // Load configuration
    let config = ServerConfig::load(&args.config)?;

    // One reactor per listen port
    let handles = Server::new(&config)?.start()?;
    for handle in &handles {
        info!("Starting hikari server: {}", handle.local_addr());
    }

    tokio::signal::ctrl_c().await?;

    // DEBUG
    info!("shutting down");
    for handle in &handles {
        handle.stop();
    }
    for handle in handles {
        handle.join()?;
    }

    Ok(())
}
