use std::net::SocketAddrV4;

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, Level};

use satrelay::api::{resolve_server_address, Network};
use satrelay::relay::multicast::MulticastConfig;
use satrelay::relay::{run_relay, RelayConfig};

/// Fetches messages from the satellite API through the internet and sends them to
/// the multicast address that an API data reader listens to - a stand-in for the
/// real satellite receiver.
#[derive(Parser)]
struct Args {
    /// destination address (ip:port) to which API data will be sent
    #[clap(short, long, default_value = "239.0.0.2:4433")]
    dest: String,

    /// network interface over which to send API data
    #[clap(short, long)]
    interface: Option<String>,

    /// choose the Mainnet or Testnet satellite API server
    #[clap(long, value_enum, conflicts_with = "server")]
    net: Option<Network>,

    /// satellite API server address
    #[clap(short, long, default_value = "https://api.blockstream.space")]
    server: String,

    /// satellite API server port
    #[clap(short, long)]
    port: Option<u16>,

    /// time to live of multicast packets
    #[clap(long, default_value_t = 1)]
    ttl: u32,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let destination: SocketAddrV4 = args.dest.parse()?;
    let api_base_url = resolve_server_address(args.net, &args.server, args.port);
    info!("relaying messages from {} to {}", api_base_url, destination);

    let config = RelayConfig::new(api_base_url, MulticastConfig {
        destination,
        interface: args.interface,
        ttl: args.ttl,
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl-C");
            shutdown_tx.send(true).ok();
        }
    });

    run_relay(config, shutdown_rx).await
}
