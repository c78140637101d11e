use std::net::{

    ToSocketAddrs,
    SocketAddr,
    Ipv4Addr,
};

use tracing::{debug};

use super::error::{EchoError};

/// Resolve `host` to its first IPv4 address. Literal addresses skip the
/// resolver entirely.
pub fn resolve_ipv4(host: &str) -> Result<Ipv4Addr, EchoError> {
    if let Ok(address) = host.parse::<Ipv4Addr>() {
        return Ok(address)
    }

    let addresses = (host, 0).to_socket_addrs().map_err(|e| {
        debug!(host, "Resolver failed: {}", e);
        EchoError::ResolverIpLookup(host.to_string())
    })?;

    addresses.filter_map(|address| match address {

        SocketAddr::V4(address) => Some(*address.ip()),
        SocketAddr::V6(_) => None,

    }).next().ok_or(EchoError::ResolverIpLookup(host.to_string()))
}
