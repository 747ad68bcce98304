//! Open, inspect and remove NAT port forwardings on every UPnP Internet Gateway
//! Device of the local network.
//!
//! A [`Workflow`] discovers gateways through a [`Discovery`], runs a fixed
//! sequence of [`Operation`]s against each of them and collects the outcome in a
//! [`WorkflowReport`], which a [`Reporter`] then presents. The bundled engine in
//! [`aio`] speaks SSDP and SOAP; anything implementing the [`gateway`] traits can
//! stand in for it.

#[macro_use]
extern crate log;

// data structures
pub use self::mapping::{InternalClient, PortMappingEntry, PortMappingProtocol, PortMappingRequest};

// errors
pub use self::errors::{ErrorKind, OperationError, OperationResult};
pub use self::errors::{
    AddPortError, GetExternalIpError, GetGenericPortMappingEntryError, GetListOfPortMappingsError, RemovePortError,
    RequestError, SearchError,
};

// collaborator boundary
pub use self::gateway::{Discovery, GatewayHandle};

// orchestration
pub use self::operation::{Operation, Outcome};
pub use self::report::{Reporter, TextReporter};
pub use self::workflow::{Phase, ReportEntry, RunOutcome, Step, Workflow, WorkflowConfig, WorkflowReport};

// search options
pub use self::common::SearchOptions;

pub mod aio;
mod common;
mod errors;
pub mod gateway;
mod mapping;
pub mod operation;
mod report;
pub mod workflow;
