//! The crate's UPnP protocol engine: SSDP search, device descriptions and SOAP
//! control requests, on tokio and hyper.

mod gateway;
mod search;
mod soap;

pub use self::gateway::Gateway;
pub use self::search::{search_gateways, UpnpDiscovery};
