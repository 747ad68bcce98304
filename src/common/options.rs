use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default address the SSDP search is sent to.
pub const DEFAULT_BROADCAST_ADDRESS: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(239, 255, 255, 250)), 1900);

/// Default search window.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default timeout of a single HTTP exchange with a gateway.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Gateway search configuration
///
/// SearchOptions::default() should suffice for most situations.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Bind address for UDP socket (defaults to all `0.0.0.0`)
    pub bind_addr: SocketAddr,
    /// Broadcast address for discovery packets (defaults to `239.255.255.250:1900`)
    pub broadcast_address: SocketAddr,
    /// How long to keep collecting answers to the search (defaults to 3s)
    pub timeout: Duration,
    /// Timeout of each description fetch and SOAP request (defaults to 5s)
    pub http_timeout: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            broadcast_address: DEFAULT_BROADCAST_ADDRESS,
            timeout: DEFAULT_TIMEOUT,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}
