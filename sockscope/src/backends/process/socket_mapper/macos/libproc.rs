// macOS libproc-based socket mapper
//
// This backend uses the native macOS libproc API via the libproc crate.
// This provides direct kernel access to socket information without spawning
// external processes like lsof.

use super::super::{SocketMapperBackend, local_endpoint, remote_endpoint};
use crate::backends::process::{SocketEntry, SocketKind};
use crate::backends::{BackendCapabilities, BackendPriority};
use crate::cancel::CancelToken;
use crate::model::{ConnectionState, Pid};
use anyhow::{Context, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

// Constants from sys/proc_info.h (not exposed by libproc crate)
const INI_IPV4: u8 = 0x1;

// TCP state constants from netinet/tcp_fsm.h
const TCPS_CLOSED: i32 = 0;
const TCPS_LISTEN: i32 = 1;
const TCPS_SYN_SENT: i32 = 2;
const TCPS_SYN_RECEIVED: i32 = 3;
const TCPS_ESTABLISHED: i32 = 4;
const TCPS_CLOSE_WAIT: i32 = 5;
const TCPS_FIN_WAIT_1: i32 = 6;
const TCPS_CLOSING: i32 = 7;
const TCPS_LAST_ACK: i32 = 8;
const TCPS_FIN_WAIT_2: i32 = 9;
const TCPS_TIME_WAIT: i32 = 10;

/// Socket mapper using native macOS libproc API
///
/// Performance: ~2-5ms per scan (vs ~10-20ms for lsof)
pub struct LibprocSocketMapper;

impl LibprocSocketMapper {
    /// Native API - most efficient
    pub const PRIORITY: BackendPriority = BackendPriority::Best;

    pub fn new() -> Result<Self> {
        if !Self::is_available() {
            anyhow::bail!("libproc not available");
        }
        Ok(Self)
    }

    /// Enumerate all network sockets using libproc API
    fn enumerate_sockets(cancel: &CancelToken) -> Result<Vec<SocketEntry>> {
        use libproc::libproc::bsd_info::BSDInfo;
        use libproc::libproc::file_info::{ListFDs, ProcFDType, pidfdinfo};
        use libproc::libproc::net_info::{SocketFDInfo, SocketInfoKind};
        use libproc::libproc::proc_pid::{listpidinfo, pidinfo};
        use libproc::processes;

        let mut sockets = Vec::new();

        // Get all PIDs
        let pids = processes::pids_by_type(processes::ProcFilter::All)
            .context("Failed to list processes")?;

        for pid in pids {
            cancel.check()?;
            let pid = pid as Pid;

            // Get BSD info to know how many FDs
            let info = match pidinfo::<BSDInfo>(pid, 0) {
                Ok(info) => info,
                Err(_) => continue, // Process may have exited
            };

            // List all file descriptors for this PID
            let fds = match listpidinfo::<ListFDs>(pid, info.pbi_nfiles as usize) {
                Ok(fds) => fds,
                Err(_) => continue, // Process may have exited
            };

            for fd in fds {
                if let ProcFDType::Socket = fd.proc_fdtype.into() {
                    let Ok(sock_info) = pidfdinfo::<SocketFDInfo>(pid, fd.proc_fd) else {
                        continue;
                    };

                    match SocketInfoKind::from(sock_info.psi.soi_kind) {
                        SocketInfoKind::Tcp => {
                            if let Some(entry) = Self::parse_tcp_socket(pid, &sock_info) {
                                sockets.push(entry);
                            }
                        }
                        SocketInfoKind::In => {
                            // Generic IP socket (typically UDP)
                            if let Some(entry) = Self::parse_in_socket(pid, &sock_info) {
                                sockets.push(entry);
                            }
                        }
                        _ => {
                            // Ignore other socket types (Unix domain, etc.)
                        }
                    }
                }
            }
        }

        Ok(sockets)
    }

    /// Parse TCP socket info into a SocketEntry
    fn parse_tcp_socket(
        pid: Pid,
        sock_info: &libproc::libproc::net_info::SocketFDInfo,
    ) -> Option<SocketEntry> {
        // soi_proto is a C union; soi_kind said TCP so pri_tcp is the live member
        unsafe {
            let tcp_info = &sock_info.psi.soi_proto.pri_tcp;
            let in_info = &tcp_info.tcpsi_ini;

            let local = Self::parse_in_sockaddr(in_info, true)?;
            let remote = Self::parse_in_sockaddr(in_info, false)?;

            Some(SocketEntry {
                pid,
                kind: SocketKind::Stream,
                local: local_endpoint(local),
                remote: remote_endpoint(remote),
                status: Self::tcp_state(tcp_info.tcpsi_state),
            })
        }
    }

    /// Parse generic IP socket info (UDP) into a SocketEntry
    fn parse_in_socket(
        pid: Pid,
        sock_info: &libproc::libproc::net_info::SocketFDInfo,
    ) -> Option<SocketEntry> {
        unsafe {
            let in_info = &sock_info.psi.soi_proto.pri_in;

            let local = Self::parse_in_sockaddr(in_info, true)?;
            let remote = Self::parse_in_sockaddr(in_info, false)?;

            Some(SocketEntry {
                pid,
                kind: SocketKind::Datagram,
                local: local_endpoint(local),
                remote: remote_endpoint(remote),
                status: ConnectionState::None,
            })
        }
    }

    /// Parse InSockInfo structure to extract IP address and port
    ///
    /// Ports are converted from network byte order to host byte order.
    fn parse_in_sockaddr(
        in_info: &libproc::libproc::net_info::InSockInfo,
        is_local: bool,
    ) -> Option<SocketAddr> {
        let port = if is_local {
            u16::from_be(in_info.insi_lport as u16)
        } else {
            u16::from_be(in_info.insi_fport as u16)
        };

        let addr_union = if is_local {
            &in_info.insi_laddr
        } else {
            &in_info.insi_faddr
        };

        let addr = if (in_info.insi_vflag & INI_IPV4) != 0 {
            unsafe {
                let ipv4_bytes = addr_union.ina_46.i46a_addr4;
                // s_addr is in network byte order
                IpAddr::V4(Ipv4Addr::from(u32::from_be(ipv4_bytes.s_addr)))
            }
        } else {
            unsafe { IpAddr::V6(Ipv6Addr::from(addr_union.ina_6.s6_addr)) }
        };

        Some(SocketAddr::new(addr, port))
    }

    fn tcp_state(state: i32) -> ConnectionState {
        match state {
            TCPS_CLOSED => ConnectionState::Close,
            TCPS_LISTEN => ConnectionState::Listen,
            TCPS_SYN_SENT => ConnectionState::SynSent,
            TCPS_SYN_RECEIVED => ConnectionState::SynRecv,
            TCPS_ESTABLISHED => ConnectionState::Established,
            TCPS_CLOSE_WAIT => ConnectionState::CloseWait,
            TCPS_FIN_WAIT_1 => ConnectionState::FinWait1,
            TCPS_CLOSING => ConnectionState::Closing,
            TCPS_LAST_ACK => ConnectionState::LastAck,
            TCPS_FIN_WAIT_2 => ConnectionState::FinWait2,
            TCPS_TIME_WAIT => ConnectionState::TimeWait,
            other => ConnectionState::Other(format!("UNKNOWN({})", other)),
        }
    }
}

impl SocketMapperBackend for LibprocSocketMapper {
    fn name(&self) -> &'static str {
        "libproc"
    }

    fn priority(&self) -> BackendPriority {
        Self::PRIORITY
    }

    fn is_available() -> bool {
        // Always available on macOS 10.5+
        cfg!(target_os = "macos")
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
        Self::enumerate_sockets(cancel)
    }
}
