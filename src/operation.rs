use std::fmt;
use std::net::IpAddr;

use crate::errors::{ErrorKind, OperationError, OperationResult};
use crate::gateway::GatewayHandle;
use crate::mapping::{PortMappingEntry, PortMappingProtocol, PortMappingRequest};

/// Upper bound on the positions probed by an index scan.
pub const MAX_ENUMERATED_ENTRIES: u32 = 65_536;

/// Largest `max_count` of a range query; the wire field is 16 bits wide.
pub const MAX_RANGE_ENTRIES: u32 = 65_535;

/// One logical action against one gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    GetExternalAddress,
    AddPortMapping(PortMappingRequest),
    /// Read a single position of the gateway's mapping table.
    ListMappingAtIndex(u32),
    /// Walk the mapping table position by position until the gateway reports its end.
    EnumerateMappings,
    /// Second generation range query.
    ListMappingRange {
        protocol: PortMappingProtocol,
        start_port: u16,
        end_port: u16,
        max_count: u32,
    },
    DeletePortMapping {
        protocol: PortMappingProtocol,
        external_port: u16,
    },
}

impl Operation {
    /// The verb name used in reports.
    pub fn name(&self) -> &'static str {
        match *self {
            Operation::GetExternalAddress => "GetExternalAddress",
            Operation::AddPortMapping(..) => "AddPortMapping",
            Operation::ListMappingAtIndex(..) => "ListMappingAtIndex",
            Operation::EnumerateMappings => "EnumerateMappings",
            Operation::ListMappingRange { .. } => "ListMappingRange",
            Operation::DeletePortMapping { .. } => "DeletePortMapping",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Operation::AddPortMapping(ref req) => write!(
                f,
                "{} {} ext:{} int:{}",
                self.name(),
                req.protocol,
                req.external_port,
                req.internal_port
            ),
            Operation::ListMappingAtIndex(index) => write!(f, "{} #{}", self.name(), index),
            Operation::ListMappingRange {
                protocol,
                start_port,
                end_port,
                max_count,
            } => write!(f, "{} {} {}-{} max:{}", self.name(), protocol, start_port, end_port, max_count),
            Operation::DeletePortMapping {
                protocol,
                external_port,
            } => write!(f, "{} {} ext:{}", self.name(), protocol, external_port),
            _ => f.write_str(self.name()),
        }
    }
}

/// Success value of an [`Operation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    ExternalAddress(IpAddr),
    /// The mapping as it was sent to the gateway.
    Mapped(PortMappingRequest),
    Removed {
        protocol: PortMappingProtocol,
        external_port: u16,
    },
    Entry(PortMappingEntry),
    Entries(Vec<PortMappingEntry>),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Outcome::ExternalAddress(ref ip) => write!(f, "{}", ip),
            Outcome::Mapped(ref req) => write!(
                f,
                "mapped {} ext:{} to {}:{} for {}s",
                req.protocol,
                req.external_port,
                req.internal_client,
                req.internal_port,
                req.lease_secs()
            ),
            Outcome::Removed {
                protocol,
                external_port,
            } => write!(f, "removed {} ext:{}", protocol, external_port),
            Outcome::Entry(ref entry) => write!(f, "{}", entry),
            Outcome::Entries(ref entries) => write!(f, "found {} entries", entries.len()),
        }
    }
}

/// Run one operation against one gateway.
///
/// Requests are validated locally first; nothing is sent for an invalid one.
pub async fn execute<G>(gateway: &G, operation: &Operation) -> OperationResult<Outcome>
where
    G: GatewayHandle + ?Sized,
{
    match *operation {
        Operation::GetExternalAddress => gateway.get_external_address().await.map(Outcome::ExternalAddress),
        Operation::AddPortMapping(ref request) => {
            request.validate()?;
            gateway.add_port_mapping(request).await?;
            Ok(Outcome::Mapped(request.clone()))
        }
        Operation::ListMappingAtIndex(index) => gateway.get_port_mapping_at_index(index).await.map(Outcome::Entry),
        Operation::EnumerateMappings => enumerate_mappings(gateway).await.map(Outcome::Entries),
        Operation::ListMappingRange {
            protocol,
            start_port,
            end_port,
            max_count,
        } => {
            if start_port > end_port {
                return Err(OperationError::new(
                    ErrorKind::Validation,
                    format!("Start port {} is above end port {}", start_port, end_port),
                ));
            }
            if max_count == 0 {
                return Err(OperationError::new(ErrorKind::Validation, "A range query must allow at least one entry"));
            }
            if max_count > MAX_RANGE_ENTRIES {
                return Err(OperationError::new(
                    ErrorKind::Validation,
                    format!("A range query returns at most {} entries, {} requested", MAX_RANGE_ENTRIES, max_count),
                ));
            }
            let entries = gateway
                .get_port_mapping_range(protocol, start_port, end_port, max_count)
                .await?;
            Ok(Outcome::Entries(restrict_to_range(entries, protocol, start_port, end_port, max_count)))
        }
        Operation::DeletePortMapping {
            protocol,
            external_port,
        } => {
            if external_port == 0 {
                return Err(OperationError::new(ErrorKind::Validation, "External port number 0 is never mapped"));
            }
            gateway.delete_port_mapping(protocol, external_port).await?;
            Ok(Outcome::Removed {
                protocol,
                external_port,
            })
        }
    }
}

/// List a gateway's mappings by probing index 0, 1, 2...
///
/// First generation gateways have no "done" signal: the table ends where a lookup
/// fails. A failure at index 0 is returned as the result, since it may equally
/// mean an empty table or a gateway that cannot be queried. A failure at any
/// later index ends the scan with the entries read so far.
pub async fn enumerate_mappings<G>(gateway: &G) -> OperationResult<Vec<PortMappingEntry>>
where
    G: GatewayHandle + ?Sized,
{
    let mut entries = Vec::new();
    for index in 0..MAX_ENUMERATED_ENTRIES {
        match gateway.get_port_mapping_at_index(index).await {
            Ok(entry) => entries.push(entry),
            Err(err) if index == 0 => return Err(err),
            Err(err) => {
                if err.kind == ErrorKind::NotFound {
                    debug!("end of the mapping table of {} at index {}", gateway.friendly_name(), index);
                } else {
                    warn!(
                        "mapping table scan of {} stopped at index {}: {}",
                        gateway.friendly_name(),
                        index,
                        err
                    );
                }
                return Ok(entries);
            }
        }
    }
    warn!(
        "{} still returned entries after {} lookups, giving up",
        gateway.friendly_name(),
        MAX_ENUMERATED_ENTRIES
    );
    Ok(entries)
}

fn restrict_to_range(
    entries: Vec<PortMappingEntry>,
    protocol: PortMappingProtocol,
    start_port: u16,
    end_port: u16,
    max_count: u32,
) -> Vec<PortMappingEntry> {
    let received = entries.len();
    let kept: Vec<_> = entries
        .into_iter()
        .filter(|e| e.protocol == protocol && e.external_port >= start_port && e.external_port <= end_port)
        .take(max_count as usize)
        .collect();
    if kept.len() != received {
        warn!(
            "gateway answered a range query with {} entries, kept {} matching {} {}-{} max:{}",
            received,
            kept.len(),
            protocol,
            start_port,
            end_port,
            max_count
        );
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    fn entry(protocol: PortMappingProtocol, external_port: u16) -> PortMappingEntry {
        PortMappingEntry {
            protocol,
            external_port,
            internal_port: external_port,
            internal_client: Ipv4Addr::new(192, 168, 0, 2).into(),
            lease_duration: Duration::from_secs(0),
            description: String::from("test"),
        }
    }

    /// A gateway answering from a fixed table, counting lookups.
    struct Table {
        entries: Vec<PortMappingEntry>,
        index_failure: ErrorKind,
        lookups: Mutex<u32>,
    }

    impl Table {
        fn new(entries: Vec<PortMappingEntry>) -> Table {
            Table {
                entries,
                index_failure: ErrorKind::NotFound,
                lookups: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl GatewayHandle for Table {
        fn friendly_name(&self) -> &str {
            "table"
        }

        async fn get_external_address(&self) -> OperationResult<IpAddr> {
            Ok(Ipv4Addr::new(203, 0, 113, 1).into())
        }

        async fn add_port_mapping(&self, _request: &PortMappingRequest) -> OperationResult<()> {
            Ok(())
        }

        async fn get_port_mapping_at_index(&self, index: u32) -> OperationResult<PortMappingEntry> {
            *self.lookups.lock().unwrap() += 1;
            self.entries
                .get(index as usize)
                .cloned()
                .ok_or_else(|| OperationError::new(self.index_failure, "SpecifiedArrayIndexInvalid"))
        }

        async fn get_port_mapping_range(
            &self,
            _protocol: PortMappingProtocol,
            _start_port: u16,
            _end_port: u16,
            _max_count: u32,
        ) -> OperationResult<Vec<PortMappingEntry>> {
            // Deliberately ignores the filter.
            Ok(self.entries.clone())
        }

        async fn delete_port_mapping(&self, _protocol: PortMappingProtocol, _external_port: u16) -> OperationResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn index_scan_stops_at_table_end() {
        let table = Table::new(vec![entry(PortMappingProtocol::UDP, 1000), entry(PortMappingProtocol::TCP, 2000)]);
        let entries = enumerate_mappings(&table).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(*table.lookups.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn index_scan_reports_failure_at_index_zero() {
        let table = Table::new(vec![]);
        let err = enumerate_mappings(&table).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(*table.lookups.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn index_scan_treats_any_later_failure_as_end() {
        let mut table = Table::new(vec![entry(PortMappingProtocol::UDP, 1000)]);
        table.index_failure = ErrorKind::Transport;
        let entries = enumerate_mappings(&table).await.unwrap();
        assert_eq!(entries, vec![entry(PortMappingProtocol::UDP, 1000)]);
    }

    #[tokio::test]
    async fn range_query_is_filtered_and_truncated() {
        let table = Table::new(vec![
            entry(PortMappingProtocol::UDP, 1000),
            entry(PortMappingProtocol::TCP, 1500),
            entry(PortMappingProtocol::UDP, 1600),
            entry(PortMappingProtocol::UDP, 1700),
            entry(PortMappingProtocol::UDP, 9000),
        ]);
        let op = Operation::ListMappingRange {
            protocol: PortMappingProtocol::UDP,
            start_port: 1000,
            end_port: 2000,
            max_count: 2,
        };
        match execute(&table, &op).await.unwrap() {
            Outcome::Entries(entries) => {
                assert_eq!(entries.len(), 2);
                assert!(entries
                    .iter()
                    .all(|e| e.protocol == PortMappingProtocol::UDP && e.external_port >= 1000 && e.external_port <= 2000));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn invalid_requests_never_reach_the_gateway() {
        let table = Table::new(vec![]);
        let inverted = Operation::ListMappingRange {
            protocol: PortMappingProtocol::TCP,
            start_port: 2000,
            end_port: 1000,
            max_count: 10,
        };
        assert_eq!(execute(&table, &inverted).await.unwrap_err().kind, ErrorKind::Validation);

        let oversized = Operation::ListMappingRange {
            protocol: PortMappingProtocol::UDP,
            start_port: 0,
            end_port: 65535,
            max_count: MAX_RANGE_ENTRIES + 1,
        };
        assert_eq!(execute(&table, &oversized).await.unwrap_err().kind, ErrorKind::Validation);

        let add = Operation::AddPortMapping(PortMappingRequest::new(PortMappingProtocol::TCP, 0, 80));
        assert_eq!(execute(&table, &add).await.unwrap_err().kind, ErrorKind::Validation);

        let delete = Operation::DeletePortMapping {
            protocol: PortMappingProtocol::TCP,
            external_port: 0,
        };
        assert_eq!(execute(&table, &delete).await.unwrap_err().kind, ErrorKind::Validation);
    }

    #[test]
    fn operation_names() {
        assert_eq!(Operation::EnumerateMappings.to_string(), "EnumerateMappings");
        let op = Operation::DeletePortMapping {
            protocol: PortMappingProtocol::UDP,
            external_port: 7777,
        };
        assert_eq!(op.to_string(), "DeletePortMapping UDP ext:7777");
    }
}
