use std::net::IpAddr;
use std::process;
use std::time::Duration;

use clap::error::ErrorKind as ClapErrorKind;
use clap::Parser;
use log::{error, warn, LevelFilter, SetLoggerError};
use simplelog::{ColorChoice, Config as LogConfig, TermLogger, TerminalMode};
use tokio_util::sync::CancellationToken;

use igd_forward::aio::UpnpDiscovery;
use igd_forward::{
    InternalClient, Operation, PortMappingProtocol, PortMappingRequest, Reporter, SearchOptions, Step, TextReporter,
    Workflow, WorkflowConfig,
};

/// Forward an IGD port to this device.
#[derive(Parser, Debug)]
#[command(name = "igd-forward", version)]
struct Cli {
    /// Public port to open in the router.
    #[arg(short = 'l', long = "logical-port")]
    logical_port: u16,

    /// Host port to listen packets from the router.
    #[arg(short = 'p', long = "physical-port")]
    physical_port: u16,

    /// Time in seconds until the port is closed again.
    #[arg(short = 't', long = "time", default_value_t = 60)]
    time: u32,

    /// Description for the port mapping.
    #[arg(short = 'd', long = "description", default_value = "test")]
    description: String,

    /// Ip of the client to open port (default: own ip).
    #[arg(short = 'c', long = "client")]
    client: Option<IpAddr>,

    /// Transport protocol of the mapping.
    #[arg(short = 'P', long = "protocol", default_value = "tcp")]
    protocol: PortMappingProtocol,

    /// Also list the existing port mappings of every gateway.
    #[arg(long)]
    list: bool,

    /// Remove the mapping of the logical port instead of adding it.
    #[arg(long)]
    delete: bool,

    /// Seconds to wait for gateways to answer the search.
    #[arg(long = "search-timeout", default_value_t = 3)]
    search_timeout: u64,

    /// Number of gateways to talk to at once.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// More output per occurrence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn steps(&self) -> Vec<Step> {
        let mut steps = vec![Step::new(Operation::GetExternalAddress)];
        if self.delete {
            steps.push(Step::new(Operation::DeletePortMapping {
                protocol: self.protocol,
                external_port: self.logical_port,
            }));
        } else {
            let request = PortMappingRequest::new(self.protocol, self.logical_port, self.physical_port)
                .with_client(self.client.map_or(InternalClient::Requester, InternalClient::Address))
                .with_description(self.description.clone())
                .with_lease(Duration::from_secs(u64::from(self.time)));
            steps.push(Step::new(Operation::AddPortMapping(request)));
        }
        if self.list {
            steps.push(Step::new(Operation::EnumerateMappings));
            steps.push(Step::new(Operation::ListMappingRange {
                protocol: self.protocol,
                start_port: 0,
                end_port: u16::MAX,
                max_count: 100,
            }));
        }
        steps
    }

    fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }
}

fn init_logging(level: LevelFilter) -> Result<(), SetLoggerError> {
    TermLogger::init(level, LogConfig::default(), TerminalMode::Stderr, ColorChoice::Auto)
}

// Help and version requests end the process successfully, usage errors do not.
fn usage_exit_code(kind: ClapErrorKind) -> i32 {
    match kind {
        ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

fn parse_args() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            process::exit(usage_exit_code(err.kind()));
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = parse_args();

    if let Err(err) = init_logging(cli.log_level()) {
        eprintln!("could not initialise logging: {}", err);
    }

    let options = SearchOptions {
        timeout: Duration::from_secs(cli.search_timeout),
        ..Default::default()
    };
    let config = WorkflowConfig::new(cli.steps()).concurrency(cli.concurrency);
    let workflow = Workflow::new(UpnpDiscovery::new(options), config);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling the run");
            interrupt.cancel();
        }
    });

    println!("Discovering IGDs");
    let outcome = workflow.run(&cancel).await;
    let code = outcome.exit_code();

    if let Err(err) = TextReporter::stdio().report(outcome.report) {
        error!("could not write the report: {}", err);
        process::exit(1);
    }
    process::exit(code);
}
