// lsof-based socket mapper (Linux and macOS)

use super::SocketMapperBackend;
use crate::backends::command::{command_exists, run_command};
use crate::backends::process::{SocketEntry, SocketKind};
use crate::backends::{BackendCapabilities, BackendPriority};
use crate::cancel::CancelToken;
use crate::model::{ConnectionState, Endpoint, Pid};
use anyhow::{Context, Result};

/// Socket mapper using lsof command
///
/// This backend executes `lsof -i -n -P -F pcfPnT` and parses the field
/// output. Every socket lsof reports already carries its owning pid.
pub struct LsofSocketMapper;

/// Socket fields gathered for the current file set
#[derive(Default)]
struct PendingSocket {
    protocol: Option<String>,
    name: Option<String>,
    state: Option<String>,
}

impl LsofSocketMapper {
    /// Spawns an external process, so it only ever backs up a native mapper.
    /// On macOS it is the usual fallback for libproc permission gaps.
    pub const PRIORITY: BackendPriority = if cfg!(target_os = "macos") {
        BackendPriority::Good
    } else {
        BackendPriority::Fallback
    };

    pub fn new() -> Result<Self> {
        if !Self::is_available() {
            anyhow::bail!("lsof command not found");
        }
        Ok(Self)
    }

    /// Parse lsof -F output format
    ///
    /// Format:
    /// p1234        <- PID (starts a process set)
    /// cFirefox     <- Command name
    /// f12          <- File descriptor (starts a file set)
    /// PTCP         <- Protocol
    /// n127.0.0.1:8080->93.184.216.34:80  <- Network address
    /// TST=ESTABLISHED  <- TCP state (other T lines are ignored)
    pub fn parse_lsof_output(output: &str) -> Vec<SocketEntry> {
        let mut sockets = Vec::new();
        let mut current_pid: Option<Pid> = None;
        let mut pending: Option<PendingSocket> = None;

        for line in output.lines() {
            if line.is_empty() {
                continue;
            }

            let mut chars = line.chars();
            let Some(marker) = chars.next() else {
                continue;
            };
            let value = chars.as_str();

            match marker {
                'p' => {
                    Self::flush(current_pid, pending.take(), &mut sockets);
                    current_pid = value.parse().ok();
                }
                'f' => {
                    Self::flush(current_pid, pending.take(), &mut sockets);
                    pending = Some(PendingSocket::default());
                }
                'P' => {
                    if let Some(p) = pending.as_mut() {
                        p.protocol = Some(value.to_string());
                    }
                }
                'n' => {
                    if let Some(p) = pending.as_mut() {
                        p.name = Some(value.to_string());
                    }
                }
                'T' => {
                    if let (Some(p), Some(state)) = (pending.as_mut(), value.strip_prefix("ST=")) {
                        p.state = Some(state.to_string());
                    }
                }
                _ => {
                    // Ignore other markers (c is not needed, names are resolved later)
                }
            }
        }

        Self::flush(current_pid, pending.take(), &mut sockets);
        sockets
    }

    fn flush(pid: Option<Pid>, pending: Option<PendingSocket>, out: &mut Vec<SocketEntry>) {
        let (Some(pid), Some(socket)) = (pid, pending) else {
            return;
        };
        let Some(name) = socket.name else {
            return;
        };

        let kind = match socket.protocol.as_deref() {
            Some("TCP") => SocketKind::Stream,
            Some("UDP") => SocketKind::Datagram,
            _ => SocketKind::Other,
        };

        let mut sides = name.splitn(2, "->");
        let Some(local) = sides.next().and_then(Self::parse_address) else {
            log::debug!("Failed to parse lsof address '{}'", name);
            return;
        };
        let remote = sides.next().and_then(Self::parse_address);

        let status = match (kind, socket.state) {
            (SocketKind::Datagram, _) | (_, None) => ConnectionState::None,
            (_, Some(state)) => ConnectionState::from_label(&state),
        };

        out.push(SocketEntry {
            pid,
            kind,
            local,
            remote,
            status,
        });
    }

    /// Parse address:port string
    ///
    /// Formats:
    /// - "127.0.0.1:8080" (IPv4)
    /// - "[::1]:8080" (IPv6)
    /// - "*:8080" (wildcard, becomes the empty ip)
    /// - "*:*" (unbound, port 0)
    pub fn parse_address(addr_str: &str) -> Option<Endpoint> {
        let (ip, port_str) = if let Some(rest) = addr_str.strip_prefix('[') {
            let (ip, tail) = rest.split_once(']')?;
            (ip, tail.strip_prefix(':')?)
        } else {
            addr_str.rsplit_once(':')?
        };

        let port = if port_str == "*" {
            0
        } else {
            port_str.parse().ok()?
        };
        let ip = if ip == "*" { "" } else { ip };

        Some(Endpoint::new(ip, port))
    }
}

impl SocketMapperBackend for LsofSocketMapper {
    fn name(&self) -> &'static str {
        "lsof"
    }

    fn priority(&self) -> BackendPriority {
        Self::PRIORITY
    }

    fn is_available() -> bool {
        command_exists("lsof")
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
        // -i: Internet connections only
        // -n: Don't resolve hostnames (faster)
        // -P: Don't resolve port names (faster)
        // -F pcfPnT: Field output (pid, command, fd, protocol, name, TCP info)
        let output = run_command("lsof", &["-i", "-n", "-P", "-F", "pcfPnT"], cancel)
            .context("Failed to execute lsof command")?;

        // lsof exits 1 on partial permission errors but still prints what it saw
        if !output.status.success() && output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                anyhow::bail!("lsof command failed: {}", stderr.trim());
            }
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let sockets = Self::parse_lsof_output(&stdout);
        cancel.check()?;
        Ok(sockets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "p1234
cnode
f19
PTCP
n*:3000
TST=LISTEN
TQR=0
f21
PTCP
n127.0.0.1:3000->127.0.0.1:51234
TST=ESTABLISHED
p99
cmDNSResponder
f8
PUDP
n*:5353
f9
PTCP
n[::1]:8080->[::1]:54321
TST=CLOSE_WAIT
";

    #[test]
    fn test_parse_lsof_output() {
        let sockets = LsofSocketMapper::parse_lsof_output(SAMPLE);
        assert_eq!(sockets.len(), 4);

        assert_eq!(sockets[0].pid, 1234);
        assert_eq!(sockets[0].kind, SocketKind::Stream);
        assert_eq!(sockets[0].local.to_string(), "*:3000");
        assert_eq!(sockets[0].remote, None);
        assert_eq!(sockets[0].status, ConnectionState::Listen);

        assert_eq!(sockets[1].status, ConnectionState::Established);
        assert_eq!(
            sockets[1].remote,
            Some(Endpoint::new("127.0.0.1", 51234))
        );

        assert_eq!(sockets[2].pid, 99);
        assert_eq!(sockets[2].kind, SocketKind::Datagram);
        assert_eq!(sockets[2].status, ConnectionState::None);

        assert_eq!(sockets[3].local, Endpoint::new("::1", 8080));
        assert_eq!(sockets[3].status, ConnectionState::CloseWait);
    }

    #[test]
    fn test_parse_address_formats() {
        assert_eq!(
            LsofSocketMapper::parse_address("127.0.0.1:3000"),
            Some(Endpoint::new("127.0.0.1", 3000))
        );
        assert_eq!(
            LsofSocketMapper::parse_address("[fe80::1]:8080"),
            Some(Endpoint::new("fe80::1", 8080))
        );
        assert_eq!(
            LsofSocketMapper::parse_address("*:*"),
            Some(Endpoint::new("", 0))
        );
        assert_eq!(LsofSocketMapper::parse_address("garbage"), None);
    }

    #[test]
    fn test_file_without_name_is_skipped() {
        let sockets = LsofSocketMapper::parse_lsof_output("p1\nf3\nPTCP\nf4\nPUDP\nn*:53\n");
        assert_eq!(sockets.len(), 1);
        assert_eq!(sockets[0].local.port, 53);
    }
}
