use std::convert::TryFrom;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{ErrorKind, OperationError, OperationResult};

/// Represents the protocols available for port mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortMappingProtocol {
    /// TCP protocol
    TCP,
    /// UDP protocol
    UDP,
}

impl fmt::Display for PortMappingProtocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match *self {
                PortMappingProtocol::TCP => "TCP",
                PortMappingProtocol::UDP => "UDP",
            }
        )
    }
}

impl FromStr for PortMappingProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TCP" => Ok(PortMappingProtocol::TCP),
            "UDP" => Ok(PortMappingProtocol::UDP),
            _ => Err(format!("unknown protocol `{}`, expected tcp or udp", s)),
        }
    }
}

/// Which LAN host a new mapping forwards to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalClient {
    /// The address this host uses to reach the gateway.
    Requester,
    /// An explicit LAN address.
    Address(IpAddr),
}

impl fmt::Display for InternalClient {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            InternalClient::Requester => write!(f, "this host"),
            InternalClient::Address(ref ip) => write!(f, "{}", ip),
        }
    }
}

/// A port mapping to be added on a gateway.
///
/// An `internal_port` of 0 is a placeholder that the workflow replaces with
/// the port of its probe socket before the request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMappingRequest {
    pub protocol: PortMappingProtocol,
    pub external_port: u16,
    pub internal_port: u16,
    pub internal_client: InternalClient,
    pub description: String,
    /// Zero means the mapping never expires.
    pub lease_duration: Duration,
}

impl PortMappingRequest {
    /// Create a request forwarding `external_port` to `internal_port` on this host,
    /// with an infinite lease and an empty description.
    pub fn new(protocol: PortMappingProtocol, external_port: u16, internal_port: u16) -> PortMappingRequest {
        PortMappingRequest {
            protocol,
            external_port,
            internal_port,
            internal_client: InternalClient::Requester,
            description: String::new(),
            lease_duration: Duration::from_secs(0),
        }
    }

    pub fn with_client(mut self, client: InternalClient) -> PortMappingRequest {
        self.internal_client = client;
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> PortMappingRequest {
        self.description = description.into();
        self
    }

    pub fn with_lease(mut self, lease_duration: Duration) -> PortMappingRequest {
        self.lease_duration = lease_duration;
        self
    }

    /// The lease in whole seconds, as sent on the wire. Saturates at `u32::MAX`.
    pub fn lease_secs(&self) -> u32 {
        u32::try_from(self.lease_duration.as_secs()).unwrap_or(u32::MAX)
    }

    /// Check the request before it is sent to any gateway.
    pub fn validate(&self) -> OperationResult<()> {
        if self.external_port == 0 {
            return Err(OperationError::new(
                ErrorKind::Validation,
                "External port number 0 (any port) is not a valid mapping",
            ));
        }
        if self.internal_port == 0 {
            return Err(OperationError::new(
                ErrorKind::Validation,
                "Can not add a mapping for local port 0",
            ));
        }
        if self.lease_duration.as_secs() > u64::from(u32::MAX) {
            return Err(OperationError::new(
                ErrorKind::Validation,
                format!("Lease of {}s does not fit the protocol's 32-bit field", self.lease_duration.as_secs()),
            ));
        }
        if self.description.contains(|c| c == '<' || c == '>' || c == '&') {
            return Err(OperationError::new(
                ErrorKind::Validation,
                "The description must not contain XML markup characters",
            ));
        }
        Ok(())
    }
}

/// One port mapping as reported by a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMappingEntry {
    pub protocol: PortMappingProtocol,
    pub external_port: u16,
    pub internal_port: u16,
    pub internal_client: IpAddr,
    /// Zero means the mapping never expires.
    pub lease_duration: Duration,
    pub description: String,
}

impl fmt::Display for PortMappingEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} EXT:{} INT:{} ADDR:{} DURATION:{}s {}",
            self.protocol,
            self.external_port,
            self.internal_port,
            self.internal_client,
            self.lease_duration.as_secs(),
            self.description
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn protocol_parses_case_insensitively() {
        assert_eq!("udp".parse::<PortMappingProtocol>(), Ok(PortMappingProtocol::UDP));
        assert_eq!("TCP".parse::<PortMappingProtocol>(), Ok(PortMappingProtocol::TCP));
        assert!("sctp".parse::<PortMappingProtocol>().is_err());
    }

    #[test]
    fn request_rejects_zero_ports() {
        let req = PortMappingRequest::new(PortMappingProtocol::UDP, 0, 4000);
        assert_eq!(req.validate().unwrap_err().kind, ErrorKind::Validation);
        let req = PortMappingRequest::new(PortMappingProtocol::UDP, 7777, 0);
        assert_eq!(req.validate().unwrap_err().kind, ErrorKind::Validation);
    }

    #[test]
    fn request_rejects_oversized_lease() {
        let req = PortMappingRequest::new(PortMappingProtocol::TCP, 80, 8080)
            .with_lease(Duration::from_secs(u64::from(u32::MAX) + 1));
        assert_eq!(req.validate().unwrap_err().kind, ErrorKind::Validation);
        assert_eq!(req.lease_secs(), u32::MAX);
    }

    #[test]
    fn request_rejects_markup_in_description() {
        let req = PortMappingRequest::new(PortMappingProtocol::TCP, 80, 8080).with_description("</u:AddPortMapping>");
        assert!(req.validate().is_err());
    }

    #[test]
    fn request_builder() {
        let req = PortMappingRequest::new(PortMappingProtocol::TCP, 80, 8080)
            .with_client(InternalClient::Address(Ipv4Addr::new(192, 168, 1, 20).into()))
            .with_description("test")
            .with_lease(Duration::from_secs(60));
        assert!(req.validate().is_ok());
        assert_eq!(req.lease_secs(), 60);
        assert_eq!(req.internal_client.to_string(), "192.168.1.20");
    }

    #[test]
    fn entry_display() {
        let entry = PortMappingEntry {
            protocol: PortMappingProtocol::UDP,
            external_port: 7777,
            internal_port: 4000,
            internal_client: Ipv4Addr::new(10, 0, 0, 2).into(),
            lease_duration: Duration::from_secs(60),
            description: "test".into(),
        };
        assert_eq!(entry.to_string(), "UDP EXT:7777 INT:4000 ADDR:10.0.0.2 DURATION:60s test");
    }
}
