// Snapshot data model: connections, applications and enrichment counters

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// OS process id. Zero means the kernel could not attribute the socket.
pub type Pid = i32;

/// Transport protocol of a socket, derived from its socket type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Unknown,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Unknown => "UNK",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state as reported by the OS.
///
/// `None` is the sentinel for connectionless sockets and renders as `"-"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    NewSynRecv,
    Other(String),
    None,
}

impl ConnectionState {
    /// Parse a state label.
    ///
    /// Accepts kernel CamelCase names (`"SynSent"`), netstat/lsof labels
    /// (`"SYN_SENT"`, `"SYN_RCVD"`) and `"-"`/empty for the sentinel.
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();

        match normalized.as_str() {
            "" | "NONE" => ConnectionState::None,
            "ESTABLISHED" => ConnectionState::Established,
            "SYNSENT" => ConnectionState::SynSent,
            "SYNRECV" | "SYNRCVD" | "SYNRECEIVED" => ConnectionState::SynRecv,
            "FINWAIT1" => ConnectionState::FinWait1,
            "FINWAIT2" => ConnectionState::FinWait2,
            "TIMEWAIT" => ConnectionState::TimeWait,
            "CLOSE" | "CLOSED" => ConnectionState::Close,
            "CLOSEWAIT" => ConnectionState::CloseWait,
            "LASTACK" => ConnectionState::LastAck,
            "LISTEN" => ConnectionState::Listen,
            "CLOSING" => ConnectionState::Closing,
            "NEWSYNRECV" => ConnectionState::NewSynRecv,
            _ => ConnectionState::Other(label.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ConnectionState::Established => "ESTABLISHED",
            ConnectionState::SynSent => "SYN_SENT",
            ConnectionState::SynRecv => "SYN_RECV",
            ConnectionState::FinWait1 => "FIN_WAIT1",
            ConnectionState::FinWait2 => "FIN_WAIT2",
            ConnectionState::TimeWait => "TIME_WAIT",
            ConnectionState::Close => "CLOSE",
            ConnectionState::CloseWait => "CLOSE_WAIT",
            ConnectionState::LastAck => "LAST_ACK",
            ConnectionState::Listen => "LISTEN",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::NewSynRecv => "NEW_SYN_RECV",
            ConnectionState::Other(label) => label,
            ConnectionState::None => "-",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One side of a socket. An empty `ip` is a wildcard bind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub ip: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ip.is_empty() {
            write!(f, "*:{}", self.port)
        } else {
            write!(f, "{}:{}", self.ip, self.port)
        }
    }
}

/// A single attributed socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub pid: Pid,
    pub protocol: Protocol,
    pub local: Endpoint,
    /// `None` when the socket has no peer (listeners, unconnected UDP).
    pub remote: Option<Endpoint>,
    pub state: ConnectionState,
}

impl Connection {
    /// Local address as `"ip:port"`.
    pub fn local_addr(&self) -> String {
        self.local.to_string()
    }

    /// Remote address as `"ip:port"`, or `"*"` when there is no peer.
    pub fn remote_addr(&self) -> String {
        match &self.remote {
            Some(endpoint) => endpoint.to_string(),
            None => "*".to_string(),
        }
    }

    /// True when either address string ends with `:<port>`.
    pub fn matches_port(&self, port: u16) -> bool {
        let suffix = format!(":{}", port);
        self.local_addr().ends_with(&suffix) || self.remote_addr().ends_with(&suffix)
    }
}

/// All sockets owned by processes sharing one display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub name: String,
    pub exe: Option<String>,
    /// Unique owning pids.
    pub pids: Vec<Pid>,
    pub connections: Vec<Connection>,
}

impl Application {
    pub fn new(name: impl Into<String>, exe: Option<String>) -> Self {
        Self {
            name: name.into(),
            exe,
            pids: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // Counts are derived from the current connection list on every call.
    pub fn established_count(&self) -> usize {
        self.count_state(&ConnectionState::Established)
    }

    pub fn listen_count(&self) -> usize {
        self.count_state(&ConnectionState::Listen)
    }

    fn count_state(&self, state: &ConnectionState) -> usize {
        self.connections.iter().filter(|c| &c.state == state).count()
    }
}

/// Immutable result of one collection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub created_at: DateTime<Utc>,
    pub applications: Vec<Application>,
    /// Sockets with an owning pid whose identity could not be resolved.
    pub skipped: usize,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            created_at: Utc::now(),
            applications: Vec::new(),
            skipped: 0,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.applications.iter().map(|a| a.connection_count()).sum()
    }

    /// Iterate `(application, connection)` pairs in snapshot order.
    pub fn connections(&self) -> impl Iterator<Item = (&Application, &Connection)> {
        self.applications
            .iter()
            .flat_map(|app| app.connections.iter().map(move |conn| (app, conn)))
    }
}

/// Cumulative byte counters for one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetIoStats {
    pub bytes_recv: u64,
    pub bytes_sent: u64,
    pub updated_at: DateTime<Utc>,
}

impl NetIoStats {
    pub fn new(bytes_recv: u64, bytes_sent: u64) -> Self {
        Self {
            bytes_recv,
            bytes_sent,
            updated_at: Utc::now(),
        }
    }

    /// Add another sample for the same process.
    pub fn accumulate(&mut self, bytes_recv: u64, bytes_sent: u64) {
        self.bytes_recv = self.bytes_recv.saturating_add(bytes_recv);
        self.bytes_sent = self.bytes_sent.saturating_add(bytes_sent);
        self.updated_at = Utc::now();
    }
}

pub type NetIoMap = HashMap<Pid, NetIoStats>;

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(pid: Pid, state: ConnectionState) -> Connection {
        Connection {
            pid,
            protocol: Protocol::Tcp,
            local: Endpoint::new("127.0.0.1", 8080),
            remote: None,
            state,
        }
    }

    #[test]
    fn test_endpoint_formatting() {
        assert_eq!(Endpoint::new("", 8080).to_string(), "*:8080");
        assert_eq!(Endpoint::new("127.0.0.1", 8080).to_string(), "127.0.0.1:8080");
        assert_eq!(Endpoint::new("::1", 443).to_string(), "::1:443");
    }

    #[test]
    fn test_absent_remote_renders_star() {
        let c = conn(1, ConnectionState::Listen);
        assert_eq!(c.remote_addr(), "*");
        assert_eq!(c.local_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_matches_port_is_suffix_match() {
        let mut c = conn(1, ConnectionState::Established);
        c.remote = Some(Endpoint::new("10.0.0.1", 443));
        assert!(c.matches_port(8080));
        assert!(c.matches_port(443));
        assert!(!c.matches_port(80));
        assert!(!c.matches_port(43));
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(ConnectionState::from_label("Established"), ConnectionState::Established);
        assert_eq!(ConnectionState::from_label("SYN_RCVD"), ConnectionState::SynRecv);
        assert_eq!(ConnectionState::from_label("FinWait1"), ConnectionState::FinWait1);
        assert_eq!(ConnectionState::from_label("TIME_WAIT").label(), "TIME_WAIT");
        assert_eq!(ConnectionState::from_label("").label(), "-");
        assert_eq!(
            ConnectionState::from_label("BOUND"),
            ConnectionState::Other("BOUND".to_string())
        );
        assert_eq!(ConnectionState::None.to_string(), "-");
    }

    #[test]
    fn test_counts_follow_connection_list() {
        let mut app = Application::new("nginx", None);
        app.connections.push(conn(1, ConnectionState::Listen));
        app.connections.push(conn(1, ConnectionState::Established));
        app.connections.push(conn(1, ConnectionState::TimeWait));
        assert_eq!(app.listen_count(), 1);
        assert_eq!(app.established_count(), 1);

        app.connections.retain(|c| c.state != ConnectionState::Listen);
        assert_eq!(app.listen_count(), 0);
        assert_eq!(app.connection_count(), 2);
    }

    #[test]
    fn test_netio_accumulates() {
        let mut stats = NetIoStats::new(1000, 2000);
        stats.accumulate(500, 300);
        assert_eq!(stats.bytes_recv, 1500);
        assert_eq!(stats.bytes_sent, 2300);
    }
}
