//! The boundary between the port-forwarding workflow and a UPnP protocol engine.
//!
//! The workflow only ever talks to gateways through these traits. The crate's
//! own engine lives in [`crate::aio`]; tests substitute in-memory gateways.

use std::net::IpAddr;

use async_trait::async_trait;

use crate::errors::OperationResult;
use crate::mapping::{PortMappingEntry, PortMappingProtocol, PortMappingRequest};

/// One discovered Internet Gateway Device.
///
/// Every method performs one network round-trip. Callers must not have two
/// calls in flight on the same handle; the workflow guarantees this by running
/// the steps of one gateway sequentially.
#[async_trait]
pub trait GatewayHandle: Send + Sync {
    /// Human readable name from the device description.
    fn friendly_name(&self) -> &str;

    /// Get the external IP address of the gateway.
    async fn get_external_address(&self) -> OperationResult<IpAddr>;

    /// Add a port mapping. Either the gateway acknowledges it or nothing changes.
    async fn add_port_mapping(&self, request: &PortMappingRequest) -> OperationResult<()>;

    /// Get the mapping at a zero-based position of the gateway's table.
    ///
    /// Positions past the end of the table fail with `ErrorKind::NotFound`.
    async fn get_port_mapping_at_index(&self, index: u32) -> OperationResult<PortMappingEntry>;

    /// Query the mappings of `protocol` with an external port in `start_port..=end_port`.
    ///
    /// Only second generation gateways implement this.
    async fn get_port_mapping_range(
        &self,
        protocol: PortMappingProtocol,
        start_port: u16,
        end_port: u16,
        max_count: u32,
    ) -> OperationResult<Vec<PortMappingEntry>>;

    /// Remove a port mapping.
    async fn delete_port_mapping(&self, protocol: PortMappingProtocol, external_port: u16) -> OperationResult<()>;
}

/// Locates the gateways on the local network.
#[async_trait]
pub trait Discovery: Send + Sync {
    type Gateway: GatewayHandle;

    /// Find every reachable gateway, in the order they answered.
    ///
    /// An empty list is a successful discovery; errors carry `ErrorKind::Discovery`.
    async fn discover(&self) -> OperationResult<Vec<Self::Gateway>>;
}
