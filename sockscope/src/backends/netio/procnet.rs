// /proc/<pid>/net/dev byte counters, one entry per network namespace
//
// Linux only exposes interface counters per namespace, not per process.
// Every namespace is attributed to its lowest visible pid so the numbers are
// never counted twice.

use super::NetIoBackend;
use crate::backends::BackendPriority;
use crate::cancel::CancelToken;
use crate::model::{NetIoMap, NetIoStats, Pid};
use anyhow::Result;
use procfs::net::DeviceStatus;
use procfs::process::Process;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::Path;

pub struct ProcNetCollector;

impl ProcNetCollector {
    pub const PRIORITY: BackendPriority = BackendPriority::Good;

    /// Sum counters over every interface except loopback
    pub fn external_totals<'a>(devices: impl IntoIterator<Item = &'a DeviceStatus>) -> (u64, u64) {
        devices
            .into_iter()
            .filter(|dev| dev.name != "lo")
            .fold((0u64, 0u64), |(rx, tx), dev| {
                (rx.saturating_add(dev.recv_bytes), tx.saturating_add(dev.sent_bytes))
            })
    }

    /// Keep the lowest pid seen for each namespace, whatever the input order
    pub fn lowest_pid_per_namespace(
        members: impl IntoIterator<Item = (Pid, u64)>,
    ) -> BTreeMap<u64, Pid> {
        let mut representatives: BTreeMap<u64, Pid> = BTreeMap::new();
        for (pid, namespace) in members {
            representatives
                .entry(namespace)
                .and_modify(|lowest| *lowest = (*lowest).min(pid))
                .or_insert(pid);
        }
        representatives
    }

    fn net_namespace(process: &Process) -> Option<u64> {
        let namespaces = process.namespaces().ok()?;
        namespaces.0.get(OsStr::new("net")).map(|ns| ns.identifier)
    }

    /// (pid, net namespace) for every process we may inspect
    fn namespace_members(cancel: &CancelToken) -> Result<Vec<(Pid, u64)>> {
        let processes = match procfs::process::all_processes() {
            Ok(processes) => processes,
            Err(e) => {
                log::debug!("Cannot enumerate processes for I/O enrichment: {}", e);
                return Ok(Vec::new());
            }
        };

        let mut members = Vec::new();
        for process in processes.flatten() {
            cancel.check()?;
            if let Some(namespace) = Self::net_namespace(&process) {
                members.push((process.pid(), namespace));
            }
        }

        Ok(members)
    }
}

impl NetIoBackend for ProcNetCollector {
    fn name(&self) -> &'static str {
        "procnet"
    }

    fn priority(&self) -> BackendPriority {
        Self::PRIORITY
    }

    fn is_available() -> bool {
        Path::new("/proc/self/net/dev").exists()
    }

    fn collect(&self, cancel: &CancelToken) -> Result<NetIoMap> {
        let mut stats = NetIoMap::new();
        let representatives = Self::lowest_pid_per_namespace(Self::namespace_members(cancel)?);

        for (namespace, pid) in representatives {
            cancel.check()?;

            let devices = match Process::new(pid).and_then(|process| process.dev_status()) {
                Ok(devices) => devices,
                Err(e) => {
                    log::debug!("Skipping namespace {} (pid {}): {}", namespace, pid, e);
                    continue;
                }
            };

            let (rx, tx) = Self::external_totals(devices.values());
            stats.insert(pid, NetIoStats::new(rx, tx));
        }

        log::debug!("Collected I/O counters for {} namespace(s)", stats.len());
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procfs::FromBufRead;
    use procfs::net::InterfaceDeviceStatus;
    use std::io::Cursor;

    const NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  987654     100    0    0    0     0          0         0   987654     100    0    0    0     0       0          0
  eth0: 1000000    2000    0    0    0     0          0         0   250000    1500    0    0    0     0       0          0
 wlan0:     500       5    0    0    0     0          0         0      700       7    0    0    0     0       0          0
";

    #[test]
    fn test_loopback_excluded_from_totals() {
        let InterfaceDeviceStatus(devices) =
            InterfaceDeviceStatus::from_buf_read(Cursor::new(NET_DEV)).unwrap();
        assert_eq!(devices.len(), 3);
        assert_eq!(
            ProcNetCollector::external_totals(devices.values()),
            (1_000_500, 250_700)
        );
    }

    #[test]
    fn test_lowest_pid_wins_in_descending_order() {
        let representatives =
            ProcNetCollector::lowest_pid_per_namespace([(900, 1), (500, 2), (40, 1), (7, 2)]);
        assert_eq!(representatives, BTreeMap::from([(1, 40), (2, 7)]));
    }

    #[test]
    fn test_lowest_pid_wins_when_interleaved() {
        let representatives = ProcNetCollector::lowest_pid_per_namespace([
            (300, 2),
            (12, 1),
            (5, 2),
            (80, 1),
            (1, 1),
            (60, 2),
        ]);
        assert_eq!(representatives, BTreeMap::from([(1, 1), (2, 5)]));
    }

    #[test]
    fn test_collect_covers_own_namespace() {
        let stats = ProcNetCollector.collect(&CancelToken::new()).unwrap();
        // The current namespace always has at least one visible pid
        assert!(!stats.is_empty());
    }

    #[test]
    fn test_cancelled_collect_fails() {
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(ProcNetCollector.collect(&cancel).is_err());
    }
}
