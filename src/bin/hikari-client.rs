use anyhow::Result;
use clap::Parser;
use hikari::{Client, ClientConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "SOCKS4/5 proxy that tunnels through a hikari server", long_about = None)]
struct Args {
    /// Path to the client JSON configuration
    #[arg(short, long, default_value = "hikari-client.json")]
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
    let config = ClientConfig::load(&args.config)?;

    // Start the client reactor
    let handle = Client::new(&config)?.start()?;
    info!("Starting hikari client: {}", handle.local_addr());

    tokio::signal::ctrl_c().await?;

    // DEBUG
    info!("shutting down");
    handle.stop();
    handle.join()
}
