// Linux procfs-based socket mapper

use super::super::{SocketMapperBackend, local_endpoint, remote_endpoint};
use crate::backends::process::{SocketEntry, SocketKind};
use crate::backends::{BackendCapabilities, BackendPriority};
use crate::cancel::CancelToken;
use crate::model::{ConnectionState, Pid};
use anyhow::{Context, Result};
use procfs::process::{FDTarget, all_processes};
use std::collections::HashMap;

/// Socket mapper using Linux /proc filesystem
///
/// This backend reads socket information from:
/// - /proc/[pid]/fd/ - for socket inodes
/// - /proc/net/tcp, /proc/net/tcp6 - for TCP connections
/// - /proc/net/udp, /proc/net/udp6 - for UDP sockets
///
/// Sockets whose inode is not held by any readable fd (TIME_WAIT, or another
/// user's process without privileges) come back with pid 0.
pub struct ProcfsSocketMapper;

impl ProcfsSocketMapper {
    /// Native Linux API, always available, fast
    pub const PRIORITY: BackendPriority = BackendPriority::Best;

    pub fn new() -> Result<Self> {
        if !Self::is_available() {
            anyhow::bail!("procfs not available (is /proc mounted?)");
        }
        Ok(Self)
    }

    /// Build socket inode -> PID map by scanning all processes
    fn build_inode_map(cancel: &CancelToken) -> Result<HashMap<u64, Pid>> {
        let mut inode_to_pid = HashMap::new();

        let all_procs = all_processes().context("Failed to list processes in /proc")?;
        for process in all_procs.flatten() {
            cancel.check()?;

            // Permission denied for other users' processes is expected
            let Ok(fds) = process.fd() else {
                continue;
            };

            for fd_info in fds.flatten() {
                if let FDTarget::Socket(inode) = fd_info.target {
                    // A socket shared across fork keeps its first (lowest) owner
                    inode_to_pid.entry(inode).or_insert(process.pid());
                }
            }
        }

        Ok(inode_to_pid)
    }
}

/// IPv6 tables are missing when IPv6 is disabled; treat that as empty
fn optional_table<T>(table: procfs::ProcResult<Vec<T>>, name: &str) -> Vec<T> {
    match table {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Skipping /proc/net/{}: {}", name, e);
            Vec::new()
        }
    }
}

impl SocketMapperBackend for ProcfsSocketMapper {
    fn name(&self) -> &'static str {
        "procfs"
    }

    fn priority(&self) -> BackendPriority {
        Self::PRIORITY
    }

    fn is_available() -> bool {
        std::path::Path::new("/proc/net/tcp").exists()
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            ipv4_support: true,
            ipv6_support: true,
            per_process: true,
            per_connection: true,
        }
    }

    fn get_socket_table(&self, cancel: &CancelToken) -> Result<Vec<SocketEntry>> {
        let inode_to_pid = Self::build_inode_map(cancel)?;
        let owner = |inode: u64| inode_to_pid.get(&inode).copied().unwrap_or(0);

        let mut sockets = Vec::new();

        let tcp = procfs::net::tcp().context("Failed to read /proc/net/tcp")?;
        let tcp6 = optional_table(procfs::net::tcp6(), "tcp6");
        for entry in tcp.into_iter().chain(tcp6) {
            cancel.check()?;
            sockets.push(SocketEntry {
                pid: owner(entry.inode),
                kind: SocketKind::Stream,
                local: local_endpoint(entry.local_address),
                remote: remote_endpoint(entry.remote_address),
                status: ConnectionState::from_label(&format!("{:?}", entry.state)),
            });
        }

        let udp = procfs::net::udp().context("Failed to read /proc/net/udp")?;
        let udp6 = optional_table(procfs::net::udp6(), "udp6");
        for entry in udp.into_iter().chain(udp6) {
            cancel.check()?;
            sockets.push(SocketEntry {
                pid: owner(entry.inode),
                kind: SocketKind::Datagram,
                local: local_endpoint(entry.local_address),
                remote: remote_endpoint(entry.remote_address),
                status: ConnectionState::None,
            });
        }

        log::debug!("procfs: {} sockets, {} owned inodes", sockets.len(), inode_to_pid.len());

        Ok(sockets)
    }
}
