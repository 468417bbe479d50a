//! Socket inventory: which process owns which TCP/UDP socket.
//!
//! A collection pass lists every socket, resolves its owning pid to a process
//! name and groups the result into per-application [`Snapshot`]s. Snapshots
//! can be narrowed with [`filter_by_port`] / [`filter_by_pid`], merged with
//! best-effort per-process byte counters, and used to signal the processes
//! behind a set of local ports.

pub mod backends;
pub mod cancel;
pub mod collector;
pub mod config;
pub mod error;
pub mod filter;
pub mod killer;
pub mod model;
pub mod report;

pub use cancel::CancelToken;
pub use collector::ConnectionCollector;
pub use config::Config;
pub use error::Error;
pub use filter::{filter_by_pid, filter_by_port};
pub use killer::{KillOutcome, KillRequest, KillTarget, Killer, NixSignalSender, SignalSender};
pub use model::{
    Application, Connection, ConnectionState, Endpoint, NetIoMap, NetIoStats, Pid, Protocol,
    Snapshot,
};
pub use report::Report;

use anyhow::Result;
use backends::netio::select_netio_backend;
use backends::process::create_process_utils;
use std::io;

/// One enumeration pass with the best socket mapper for this platform
pub fn collect(cancel: &CancelToken) -> Result<Snapshot> {
    ConnectionCollector::new()?.collect(cancel)
}

/// A Snapshot plus per-process byte counters
///
/// The counters are best-effort and come back empty when no enrichment
/// backend works on this host.
pub fn collect_once(cancel: &CancelToken) -> Result<(Snapshot, NetIoMap)> {
    let collector = ConnectionCollector::new()?;
    let netio = select_netio_backend(None);
    collector.collect_once(netio.as_deref(), cancel)
}

pub fn process_exists(pid: Pid) -> bool {
    match create_process_utils(None) {
        Ok(process_utils) => process_utils.process_exists(pid),
        Err(e) => {
            log::debug!("Cannot check pid {}: {:#}", pid, e);
            false
        }
    }
}

/// Signal every process bound to the requested local ports
///
/// Confirmation is read from stdin unless `request.assume_yes` is set.
pub fn resolve_and_kill(request: &KillRequest, cancel: &CancelToken) -> Result<KillOutcome> {
    killer::resolve_signal(&request.signal)?;

    let collector = ConnectionCollector::new()?;
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();

    Killer::new(&collector, &NixSignalSender).run(request, cancel, &mut input, &mut output)
}
