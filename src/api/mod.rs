pub mod client;
pub mod feed;

/// Well-known satellite API deployments.
#[derive(Debug, Clone, Copy, Eq, PartialEq, clap::ValueEnum)]
pub enum Network {
    Main,
    Test,
}

/// Resolves the effective API base address from the configuration surface: a
///  well-known network name overrides an explicit server address, an explicit
///  port is appended, and the legacy satellite.blockstream.com address gets its
///  `/api` suffix added.
pub fn resolve_server_address(net: Option<Network>, server: &str, port: Option<u16>) -> String {
    let server = match net {
        Some(Network::Main) => "https://api.blockstream.space",
        Some(Network::Test) => "https://api.blockstream.space/testnet",
        None => server,
    };

    let mut server_addr = server.to_string();
    if let Some(port) = port {
        server_addr = format!("{}:{}", server_addr, port);
    }

    if server_addr == "https://satellite.blockstream.com" {
        server_addr.push_str("/api");
    }
    server_addr
}
