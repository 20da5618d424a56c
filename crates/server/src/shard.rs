use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};

use chbackup_core::config::ApiConfig;

/// Listen address for this agent. Each shard of a cluster configures its own
/// `shard_http_port`, so several agents can run side by side on one host.
pub fn listen_addr(api: &ApiConfig, port_override: Option<u16>) -> Result<SocketAddr> {
    let ip: IpAddr = match api.listen_host.as_str() {
        "localhost" => IpAddr::from([127, 0, 0, 1]),
        host => host
            .parse()
            .with_context(|| format!("invalid api.listen_host '{host}'"))?,
    };
    let port = port_override.unwrap_or(api.shard_http_port);
    Ok(SocketAddr::new(ip, port))
}
