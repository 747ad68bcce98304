//! Discovery, per-gateway dispatch and result collection for one run.

use std::cmp;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use futures::stream::{self, StreamExt};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::errors::{ErrorKind, OperationError, OperationResult};
use crate::gateway::{Discovery, GatewayHandle};
use crate::operation::{self, Operation, Outcome};

/// One configured operation of the per-gateway sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub operation: Operation,
    /// Only attempt this step if the previous one succeeded.
    pub chained: bool,
}

impl Step {
    /// A step that is always attempted.
    pub fn new(operation: Operation) -> Step {
        Step {
            operation,
            chained: false,
        }
    }

    /// A step that is skipped when the previous step of the same gateway failed.
    pub fn chained(operation: Operation) -> Step {
        Step {
            operation,
            chained: true,
        }
    }
}

/// What a run does with each discovered gateway.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Operations run against every gateway, in this order.
    pub steps: Vec<Step>,
    /// How many gateways are worked on at once. 1 processes them one after the other.
    pub max_concurrent_gateways: usize,
    /// Where to bind the run's probe socket, `None` to run without one.
    pub probe_bind: Option<SocketAddr>,
}

impl Default for WorkflowConfig {
    fn default() -> WorkflowConfig {
        WorkflowConfig {
            steps: Vec::new(),
            max_concurrent_gateways: 1,
            probe_bind: Some(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))),
        }
    }
}

impl WorkflowConfig {
    pub fn new(steps: Vec<Step>) -> WorkflowConfig {
        WorkflowConfig {
            steps,
            ..Default::default()
        }
    }

    pub fn concurrency(mut self, max_concurrent_gateways: usize) -> WorkflowConfig {
        self.max_concurrent_gateways = cmp::max(1, max_concurrent_gateways);
        self
    }

    pub fn probe(mut self, probe_bind: Option<SocketAddr>) -> WorkflowConfig {
        self.probe_bind = probe_bind;
        self
    }
}

/// State of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Discovering,
    Dispatching,
    /// Terminal: the report is complete.
    Reporting,
    /// Terminal: discovery failed, there was nothing to dispatch to.
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The recorded result of one operation against one gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    /// Position of the gateway in the discovery result.
    pub gateway_index: usize,
    pub gateway: String,
    pub operation: Operation,
    pub result: OperationResult<Outcome>,
}

/// Everything a run found out, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowReport {
    discovery: OperationResult<Vec<String>>,
    entries: Vec<ReportEntry>,
}

impl WorkflowReport {
    fn discovered(gateways: Vec<String>) -> WorkflowReport {
        WorkflowReport {
            discovery: Ok(gateways),
            entries: Vec::new(),
        }
    }

    fn failed(err: OperationError) -> WorkflowReport {
        WorkflowReport {
            discovery: Err(err),
            entries: Vec::new(),
        }
    }

    fn append(&mut self, entries: Vec<ReportEntry>) {
        self.entries.extend(entries);
    }

    /// Friendly names of the discovered gateways, or the discovery error.
    pub fn discovery(&self) -> Result<&[String], &OperationError> {
        self.discovery.as_ref().map(Vec::as_slice)
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    /// Entries recorded for the gateway at `gateway_index`.
    pub fn gateway_entries(&self, gateway_index: usize) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(move |e| e.gateway_index == gateway_index)
    }

    /// Whether discovery failed or any operation recorded an error.
    pub fn has_errors(&self) -> bool {
        self.discovery.is_err() || self.entries.iter().any(|e| e.result.is_err())
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Either `Phase::Reporting` or `Phase::Failed`.
    pub phase: Phase,
    pub report: WorkflowReport,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.phase == Phase::Reporting && !self.report.has_errors()
    }

    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }
}

/// Runs the configured steps against every gateway a [`Discovery`] finds.
pub struct Workflow<D> {
    discovery: D,
    config: WorkflowConfig,
}

impl<D: Discovery> Workflow<D> {
    pub fn new(discovery: D, config: WorkflowConfig) -> Workflow<D> {
        Workflow { discovery, config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Perform one run.
    ///
    /// Gateways are worked on concurrently up to `max_concurrent_gateways`, but the
    /// steps of one gateway always run one at a time and the report is ordered by
    /// discovery. Cancelling `cancel` stops issuing operations; an operation in
    /// flight is abandoned and recorded as cancelled.
    pub async fn run(&self, cancel: &CancellationToken) -> RunOutcome {
        debug!("entering phase {}", Phase::Discovering);
        let discovered = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(OperationError::new(ErrorKind::Cancelled, "discovery was cancelled")),
            result = self.discovery.discover() => result,
        };

        let gateways = match discovered {
            Ok(gateways) => gateways,
            Err(err) => {
                error!("gateway discovery failed: {}", err);
                debug!("entering phase {}", Phase::Failed);
                return RunOutcome {
                    phase: Phase::Failed,
                    report: WorkflowReport::failed(err),
                };
            }
        };

        info!("discovered {} gateway(s)", gateways.len());
        let mut report = WorkflowReport::discovered(gateways.iter().map(|g| g.friendly_name().to_owned()).collect());
        if gateways.is_empty() {
            debug!("entering phase {}", Phase::Reporting);
            return RunOutcome {
                phase: Phase::Reporting,
                report,
            };
        }

        debug!("entering phase {}", Phase::Dispatching);
        // Held until every gateway is done; dropped on every way out of this function.
        let probe = self.open_probe().await;
        let probe_port = probe.as_ref().and_then(|s| s.local_addr().ok()).map(|a| a.port());
        let steps = resolve_probe_port(&self.config.steps, probe_port);

        let per_gateway: Vec<Vec<ReportEntry>> = stream::iter(gateways.iter().enumerate())
            .map(|(index, gateway)| run_steps(index, gateway, &steps, cancel))
            .buffered(cmp::max(1, self.config.max_concurrent_gateways))
            .collect()
            .await;
        for entries in per_gateway {
            report.append(entries);
        }
        drop(probe);

        debug!("entering phase {}", Phase::Reporting);
        RunOutcome {
            phase: Phase::Reporting,
            report,
        }
    }

    async fn open_probe(&self) -> Option<UdpSocket> {
        let addr = self.config.probe_bind?;
        match UdpSocket::bind(addr).await {
            Ok(socket) => {
                if let Ok(local) = socket.local_addr() {
                    info!("probe socket bound to {}", local);
                }
                Some(socket)
            }
            Err(err) => {
                warn!("could not bind probe socket on {}: {}", addr, err);
                None
            }
        }
    }
}

/// Replace the "any" internal port of mapping requests with the probe socket's port.
fn resolve_probe_port(steps: &[Step], probe_port: Option<u16>) -> Vec<Step> {
    steps
        .iter()
        .map(|step| match (&step.operation, probe_port) {
            (Operation::AddPortMapping(req), Some(port)) if req.internal_port == 0 => {
                let mut req = req.clone();
                req.internal_port = port;
                Step {
                    operation: Operation::AddPortMapping(req),
                    chained: step.chained,
                }
            }
            _ => step.clone(),
        })
        .collect()
}

async fn run_steps<G>(index: usize, gateway: &G, steps: &[Step], cancel: &CancellationToken) -> Vec<ReportEntry>
where
    G: GatewayHandle,
{
    let name = gateway.friendly_name();
    debug!("dispatching {} step(s) to gateway #{} ({})", steps.len(), index, name);

    let mut entries = Vec::with_capacity(steps.len());
    let mut previous_ok = true;
    for step in steps {
        let result = if cancel.is_cancelled() {
            Err(OperationError::new(ErrorKind::Cancelled, "the run was cancelled before this step"))
        } else if step.chained && !previous_ok {
            Err(OperationError::new(ErrorKind::Skipped, "the previous step failed"))
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(OperationError::new(ErrorKind::Cancelled, "abandoned while in flight")),
                result = operation::execute(gateway, &step.operation) => result,
            }
        };

        match result {
            Ok(ref outcome) => debug!("{}: {} -> {}", name, step.operation, outcome),
            Err(ref err) => warn!("{}: {} failed: {}", name, step.operation, err),
        }
        previous_ok = result.is_ok();
        entries.push(ReportEntry {
            gateway_index: index,
            gateway: name.to_owned(),
            operation: step.operation.clone(),
            result,
        });
    }
    entries
}
