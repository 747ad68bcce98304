use std::net::{SocketAddr, SocketAddrV4};
use std::str;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future;
use hyper::Client;
use tokio::net::UdpSocket;
use tokio::time::{timeout, timeout_at, Instant};

use crate::aio::Gateway;
use crate::common::{messages, parsing, SearchOptions};
use crate::errors::{OperationError, OperationResult, SearchError};
use crate::gateway::Discovery;

const MAX_RESPONSE_SIZE: usize = 1500;

/// Search for every gateway answering within `options.timeout`.
///
/// Gateways are returned in the order their first answer arrived. Hearing from
/// nobody is not an error; failing to send or receive on the socket is.
pub async fn search_gateways(options: SearchOptions) -> Result<Vec<Gateway>, SearchError> {
    // Create socket for future calls
    let socket = UdpSocket::bind(&options.bind_addr).await?;

    for target in messages::SEARCH_TARGETS.iter() {
        debug!(
            "sending broadcast request for {} to: {} on interface: {:?}",
            target,
            options.broadcast_address,
            socket.local_addr()
        );
        socket
            .send_to(messages::format_search_request(target).as_bytes(), options.broadcast_address)
            .await?;
    }

    let locations = collect_locations(&socket, Instant::now() + options.timeout).await?;
    drop(socket);

    let described = future::join_all(
        locations
            .iter()
            .map(|&(addr, ref path)| describe(addr, path, options.http_timeout)),
    )
    .await;

    let mut gateways = Vec::with_capacity(described.len());
    for (&(addr, ref path), result) in locations.iter().zip(described) {
        match result {
            Ok(description) => {
                debug!(
                    "gateway at {} offers {} on {}",
                    addr, description.service_type, description.control_url
                );
                gateways.push(Gateway::new(addr, path.clone(), description, options.http_timeout));
            }
            Err(err) => warn!("ignoring device at {}{}: {}", addr, path, err),
        }
    }
    Ok(gateways)
}

// Read search answers until the deadline, keeping each location once.
async fn collect_locations(socket: &UdpSocket, deadline: Instant) -> Result<Vec<(SocketAddrV4, String)>, SearchError> {
    let mut locations: Vec<(SocketAddrV4, String)> = Vec::new();
    let mut buff = [0u8; MAX_RESPONSE_SIZE];
    loop {
        let (n, from) = match timeout_at(deadline, socket.recv_from(&mut buff)).await {
            Ok(received) => received?,
            Err(_) => return Ok(locations),
        };
        match handle_broadcast_resp(from, &buff[..n]) {
            Ok(location) => {
                if locations.contains(&location) {
                    debug!("received duplicate broadcast response from: {}, dropping", from);
                } else {
                    debug!("received broadcast response from: {}", from);
                    locations.push(location);
                }
            }
            Err(err) => debug!("ignoring broadcast response from {}: {}", from, err),
        }
    }
}

// Handle a UDP response message
fn handle_broadcast_resp(from: SocketAddr, data: &[u8]) -> Result<(SocketAddrV4, String), SearchError> {
    debug!("handling broadcast response from: {}", from);

    // Convert response to text
    let text = str::from_utf8(data)?;

    // Parse socket address and path
    parsing::parse_search_result(text)
}

// Fetch the device description and extract the connection service from it.
async fn describe(addr: SocketAddrV4, path: &str, limit: Duration) -> Result<parsing::DeviceDescription, SearchError> {
    let uri: hyper::Uri = format!("http://{}{}", addr, path).parse()?;
    debug!("requesting control url from: {}", uri);

    let client = Client::new();
    let resp = timeout(limit, client.get(uri))
        .await
        .map_err(|_| SearchError::IoError(std::io::ErrorKind::TimedOut.into()))??;
    let body: Bytes = timeout(limit, hyper::body::to_bytes(resp.into_body()))
        .await
        .map_err(|_| SearchError::IoError(std::io::ErrorKind::TimedOut.into()))??;

    parsing::parse_device_description(body.as_ref())
}

/// [`Discovery`] over SSDP with the crate's own gateway engine.
#[derive(Debug, Clone, Default)]
pub struct UpnpDiscovery {
    options: SearchOptions,
}

impl UpnpDiscovery {
    pub fn new(options: SearchOptions) -> UpnpDiscovery {
        UpnpDiscovery { options }
    }
}

#[async_trait]
impl Discovery for UpnpDiscovery {
    type Gateway = Gateway;

    async fn discover(&self) -> OperationResult<Vec<Gateway>> {
        search_gateways(self.options.clone()).await.map_err(OperationError::from)
    }
}
