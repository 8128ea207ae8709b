use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use encore_relay::{Relay, RelayConfig};

#[derive(Parser)]
#[command(name = "encore-relay", about = "Now-playing relay hub for Encore producers and consumers")]
struct Cli {
    /// Address to listen on (default: $ENCORE_RELAY_ADDR or 0.0.0.0:17777).
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Maximum connection age in seconds before it is force-closed.
    #[arg(long, default_value = "1800")]
    session_timeout: u64,

    /// Seconds between expiry sweeps.
    #[arg(long, default_value = "60")]
    sweep_interval: u64,

    /// Frames queued per connection before new ones are dropped.
    #[arg(long, default_value = "256")]
    outbound_buffer: usize,

    /// Max inbound frame size in bytes.
    #[arg(long, default_value = "1048576")]
    max_frame_size: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = RelayConfig::new()
        .session_idle_ceiling(Duration::from_secs(cli.session_timeout))
        .sweep_interval(Duration::from_secs(cli.sweep_interval.max(1)))
        .outbound_buffer(cli.outbound_buffer)
        .max_frame_size(cli.max_frame_size);
    if let Some(addr) = cli.bind {
        config = config.bind_addr(addr);
    }

    let (relay, addr) = Relay::bind(config).await?;
    eprintln!("encore-relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("Listening on ws://{addr}");

    tokio::signal::ctrl_c().await?;
    eprintln!("Shutting down...");
    relay.shutdown().await;
    Ok(())
}
