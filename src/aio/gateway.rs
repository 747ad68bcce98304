use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use super::soap;
use crate::common::messages;
use crate::common::parsing::{self, DeviceDescription, RequestResult};
use crate::errors::{
    AddPortError, GetExternalIpError, GetGenericPortMappingEntryError, GetListOfPortMappingsError, OperationResult,
    RemovePortError,
};
use crate::gateway::GatewayHandle;
use crate::mapping::{InternalClient, PortMappingEntry, PortMappingProtocol, PortMappingRequest};

/// This structure represents a gateway found by the search functions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gateway {
    /// Socket address of the gateway
    pub addr: SocketAddrV4,
    /// Path of the device description
    pub root_url: String,
    /// Control url of the device
    pub control_url: String,
    /// URN of the connection service used for every request
    pub service_type: String,
    /// Name advertised by the device, or its address if it has none
    pub friendly_name: String,
    timeout: Duration,
}

impl Gateway {
    pub(crate) fn new(addr: SocketAddrV4, root_url: String, description: DeviceDescription, timeout: Duration) -> Gateway {
        let friendly_name = if description.friendly_name.is_empty() {
            addr.to_string()
        } else {
            description.friendly_name
        };
        Gateway {
            addr,
            root_url,
            control_url: description.control_url,
            service_type: description.service_type,
            friendly_name,
            timeout,
        }
    }

    /// Generation of the connection service, 1 or 2.
    pub fn version(&self) -> u8 {
        if self.service_type.ends_with(":2") {
            2
        } else {
            1
        }
    }

    async fn perform_request(&self, action: &str, body: &str) -> RequestResult {
        let url = format!("{}", self);
        let header = messages::soap_action(&self.service_type, action);
        let text = soap::send_async(&url, soap::Action::new(&header), body, self.timeout).await?;
        parsing::parse_response(text, &format!("{}Response", action))
    }

    // The address of the interface this host reaches the gateway through.
    async fn local_address(&self) -> io::Result<IpAddr> {
        let socket = UdpSocket::bind(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))).await?;
        socket.connect(SocketAddr::V4(self.addr)).await?;
        Ok(socket.local_addr()?.ip())
    }

    /// Get the external IP address of the gateway.
    pub async fn get_external_ip(&self) -> Result<IpAddr, GetExternalIpError> {
        let result = self
            .perform_request(
                messages::GET_EXTERNAL_IP_ACTION,
                &messages::format_get_external_ip_message(&self.service_type),
            )
            .await;
        parsing::parse_get_external_ip_response(result)
    }

    /// Add a port mapping.
    ///
    /// The lease_duration parameter is in seconds. A value of 0 is infinite.
    pub async fn add_port(
        &self,
        protocol: PortMappingProtocol,
        external_port: u16,
        local_addr: SocketAddr,
        lease_duration: u32,
        description: &str,
    ) -> Result<(), AddPortError> {
        let body = messages::format_add_port_mapping_message(
            &self.service_type,
            protocol,
            external_port,
            local_addr.ip(),
            local_addr.port(),
            lease_duration,
            description,
        );
        self.perform_request(messages::ADD_PORT_MAPPING_ACTION, &body)
            .await
            .map(|_| ())
            .map_err(parsing::convert_add_port_error)
    }

    /// Remove a port mapping.
    pub async fn remove_port(&self, protocol: PortMappingProtocol, external_port: u16) -> Result<(), RemovePortError> {
        let result = self
            .perform_request(
                messages::DELETE_PORT_MAPPING_ACTION,
                &messages::format_delete_port_message(&self.service_type, protocol, external_port),
            )
            .await;
        parsing::parse_delete_port_mapping_response(result)
    }

    /// Get one port mapping entry by its position in the gateway's table.
    pub async fn get_generic_port_mapping_entry(
        &self,
        index: u32,
    ) -> Result<PortMappingEntry, GetGenericPortMappingEntryError> {
        let result = self
            .perform_request(
                messages::GET_GENERIC_PORT_MAPPING_ENTRY_ACTION,
                &messages::format_get_generic_port_mapping_entry_message(&self.service_type, index),
            )
            .await;
        parsing::parse_get_generic_port_mapping_entry(result)
    }

    /// Get the mappings of `protocol` between two external ports. Needs a version 2 service.
    pub async fn get_list_of_port_mappings(
        &self,
        protocol: PortMappingProtocol,
        start_port: u16,
        end_port: u16,
        max_count: u32,
    ) -> Result<Vec<PortMappingEntry>, GetListOfPortMappingsError> {
        if self.version() < 2 {
            return Err(GetListOfPortMappingsError::NotSupported);
        }
        let result = self
            .perform_request(
                messages::GET_LIST_OF_PORT_MAPPINGS_ACTION,
                &messages::format_get_list_of_port_mappings_message(
                    &self.service_type,
                    protocol,
                    start_port,
                    end_port,
                    max_count,
                ),
            )
            .await;
        parsing::parse_get_list_of_port_mappings(result)
    }
}

#[async_trait]
impl GatewayHandle for Gateway {
    fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    async fn get_external_address(&self) -> OperationResult<IpAddr> {
        Ok(self.get_external_ip().await?)
    }

    async fn add_port_mapping(&self, request: &PortMappingRequest) -> OperationResult<()> {
        let client = match request.internal_client {
            InternalClient::Address(ip) => ip,
            InternalClient::Requester => self.local_address().await.map_err(AddPortError::NoLocalAddress)?,
        };
        self.add_port(
            request.protocol,
            request.external_port,
            SocketAddr::new(client, request.internal_port),
            request.lease_secs(),
            &request.description,
        )
        .await?;
        Ok(())
    }

    async fn get_port_mapping_at_index(&self, index: u32) -> OperationResult<PortMappingEntry> {
        Ok(self.get_generic_port_mapping_entry(index).await?)
    }

    async fn get_port_mapping_range(
        &self,
        protocol: PortMappingProtocol,
        start_port: u16,
        end_port: u16,
        max_count: u32,
    ) -> OperationResult<Vec<PortMappingEntry>> {
        Ok(self
            .get_list_of_port_mappings(protocol, start_port, end_port, max_count)
            .await?)
    }

    async fn delete_port_mapping(&self, protocol: PortMappingProtocol, external_port: u16) -> OperationResult<()> {
        Ok(self.remove_port(protocol, external_port).await?)
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "http://{}{}", self.addr, self.control_url)
    }
}
