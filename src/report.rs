use std::io::{self, Write};
use std::net::IpAddr;

use crate::operation::{Operation, Outcome};
use crate::workflow::{ReportEntry, WorkflowReport};

const PAD: &str = "  ";

/// Presents the outcome of a run.
pub trait Reporter {
    fn report(&mut self, report: WorkflowReport) -> io::Result<()>;
}

/// Writes a human readable report: progress and successes to `out`, errors to `err`.
pub struct TextReporter<O, E> {
    out: O,
    err: E,
}

impl TextReporter<io::Stdout, io::Stderr> {
    /// Report to standard output and standard error.
    pub fn stdio() -> Self {
        TextReporter::new(io::stdout(), io::stderr())
    }
}

impl<O: Write, E: Write> TextReporter<O, E> {
    pub fn new(out: O, err: E) -> Self {
        TextReporter { out, err }
    }

    pub fn into_inner(self) -> (O, E) {
        (self.out, self.err)
    }

    fn gateway(&mut self, report: &WorkflowReport, index: usize, name: &str) -> io::Result<()> {
        writeln!(self.out, "IGD: {}", name)?;
        let external_ip = report.gateway_entries(index).find_map(|e| match e.result {
            Ok(Outcome::ExternalAddress(ip)) => Some(ip),
            _ => None,
        });

        for entry in report.gateway_entries(index) {
            match entry.result {
                Ok(ref outcome) => {
                    writeln!(self.out, "{}{}: {}", PAD, entry.operation, outcome)?;
                    self.details(entry, outcome, external_ip)?;
                }
                Err(ref e) => {
                    writeln!(self.err, "IGD {}: {}: Error: {}", name, entry.operation, e)?;
                }
            }
        }
        Ok(())
    }

    fn details(&mut self, entry: &ReportEntry, outcome: &Outcome, external_ip: Option<IpAddr>) -> io::Result<()> {
        match (&entry.operation, outcome) {
            (Operation::AddPortMapping(..), Outcome::Mapped(req)) => {
                let external = match external_ip {
                    Some(ip) => format!("{}:{}", ip, req.external_port),
                    None => format!("port {}", req.external_port),
                };
                writeln!(
                    self.out,
                    "{}The external address {} will be forwarded to {}:{} during {} seconds",
                    PAD,
                    external,
                    req.internal_client,
                    req.internal_port,
                    req.lease_secs()
                )
            }
            (_, Outcome::Entries(entries)) => {
                for e in entries {
                    writeln!(self.out, "{}{}{}", PAD, PAD, e)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl<O: Write, E: Write> Reporter for TextReporter<O, E> {
    fn report(&mut self, report: WorkflowReport) -> io::Result<()> {
        let names = match report.discovery() {
            Ok(names) => names.to_vec(),
            Err(e) => {
                writeln!(self.err, "Error in discovery: {}", e)?;
                return self.err.flush();
            }
        };

        writeln!(self.out, "Discovery succeeded. Found {} IGDs", names.len())?;
        for (index, name) in names.iter().enumerate() {
            self.gateway(&report, index, name)?;
        }
        self.out.flush()?;
        self.err.flush()
    }
}
