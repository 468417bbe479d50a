// Serialisable view of a Snapshot merged with enrichment counters

use crate::model::{Application, Connection, NetIoMap, Pid, Snapshot};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionReport {
    pub pid: Pid,
    pub protocol: String,
    pub local: String,
    pub remote: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationReport {
    pub name: String,
    pub exe: Option<String>,
    pub pids: Vec<Pid>,
    pub connection_count: usize,
    pub established: usize,
    pub listen: usize,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub connections: Vec<ConnectionReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub applications: Vec<ApplicationReport>,
    pub skipped: usize,
}

impl From<&Connection> for ConnectionReport {
    fn from(conn: &Connection) -> Self {
        Self {
            pid: conn.pid,
            protocol: conn.protocol.to_string(),
            local: conn.local_addr(),
            remote: conn.remote_addr(),
            state: conn.state.label().to_string(),
        }
    }
}

impl ApplicationReport {
    fn build(app: &Application, netio: &NetIoMap) -> Self {
        let (bytes_sent, bytes_recv) = app
            .pids
            .iter()
            .filter_map(|pid| netio.get(pid))
            .fold((0u64, 0u64), |(sent, recv), stats| {
                (
                    sent.saturating_add(stats.bytes_sent),
                    recv.saturating_add(stats.bytes_recv),
                )
            });

        Self {
            name: app.name.clone(),
            exe: app.exe.clone(),
            pids: app.pids.clone(),
            connection_count: app.connection_count(),
            established: app.established_count(),
            listen: app.listen_count(),
            bytes_sent,
            bytes_recv,
            connections: app.connections.iter().map(ConnectionReport::from).collect(),
        }
    }
}

impl Report {
    /// Merge enrichment counters into a snapshot by pid
    pub fn build(snapshot: &Snapshot, netio: &NetIoMap) -> Self {
        Self {
            applications: snapshot
                .applications
                .iter()
                .map(|app| ApplicationReport::build(app, netio))
                .collect(),
            skipped: snapshot.skipped,
        }
    }

    /// Plain-text table for terminal output
    pub fn render_table(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(
            out,
            "{:<24} {:<16} {:>5} {:>5} {:>6} {:>10} {:>10}",
            "APPLICATION", "PIDS", "CONNS", "EST", "LISTEN", "SENT", "RECV"
        );

        for app in &self.applications {
            let pids = app
                .pids
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(",");

            let _ = writeln!(
                out,
                "{:<24} {:<16} {:>5} {:>5} {:>6} {:>10} {:>10}",
                truncate(&app.name, 24),
                truncate(&pids, 16),
                app.connection_count,
                app.established,
                app.listen,
                format_bytes(app.bytes_sent),
                format_bytes(app.bytes_recv)
            );

            for conn in &app.connections {
                let _ = writeln!(
                    out,
                    "    {:<4} {:<8} {:<40} {:<40} {}",
                    conn.protocol, conn.pid, conn.local, conn.remote, conn.state
                );
            }
        }

        if self.skipped > 0 {
            let _ = writeln!(
                out,
                "\n{} connection(s) skipped (owner not resolvable)",
                self.skipped
            );
        }

        out
    }
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
        cut.push('~');
        cut
    }
}
