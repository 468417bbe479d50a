// Connection collection: socket table + identity resolution -> Snapshot

use crate::backends::netio::NetIoBackend;
use crate::backends::process::{
    ProcessIdentity, ProcessUtils, SocketEntry, SocketKind, create_process_utils,
};
use crate::cancel::CancelToken;
use crate::error::Error;
use crate::model::{
    Application, Connection, ConnectionState, NetIoMap, Pid, Protocol, Snapshot,
};
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Pid -> identity memo for a single collection pass
///
/// Never outlives the pass that created it: pids get reused by the OS, so an
/// entry from an earlier pass may name an unrelated process.
struct IdentityCache<'a> {
    process_utils: &'a dyn ProcessUtils,
    entries: RwLock<HashMap<Pid, Option<ProcessIdentity>>>,
}

impl<'a> IdentityCache<'a> {
    fn new(process_utils: &'a dyn ProcessUtils) -> Self {
        Self {
            process_utils,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a pid, `None` when the process has no readable name
    fn resolve(&self, pid: Pid) -> Option<ProcessIdentity> {
        if let Some(hit) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pid)
        {
            return hit.clone();
        }

        let resolved = match self.process_utils.get_process_identity(pid) {
            Ok(identity) => Some(identity),
            Err(e) => {
                log::debug!("Could not resolve pid {}: {:#}", pid, e);
                None
            }
        };

        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pid, resolved.clone());
        resolved
    }
}

/// Builds Snapshots from the platform socket table
pub struct ConnectionCollector {
    process_utils: Box<dyn ProcessUtils>,
}

impl ConnectionCollector {
    /// Collector using the best socket mapper for this platform
    pub fn new() -> Result<Self> {
        Self::with_socket_mapper(None)
    }

    /// Collector using a named socket mapper, or the best available one
    pub fn with_socket_mapper(preference: Option<&str>) -> Result<Self> {
        let process_utils = create_process_utils(preference)?;
        log::debug!(
            "Using socket mapper: {}",
            process_utils.socket_mapper_name()
        );
        Ok(Self { process_utils })
    }

    pub fn with_process_utils(process_utils: Box<dyn ProcessUtils>) -> Self {
        Self { process_utils }
    }

    pub fn socket_mapper_name(&self) -> &'static str {
        self.process_utils.socket_mapper_name()
    }

    pub fn process_exists(&self, pid: Pid) -> bool {
        self.process_utils.process_exists(pid)
    }

    /// Run one enumeration pass
    ///
    /// Fails without a partial result when the socket table can't be read or
    /// `cancel` fires. Pids that can't be resolved are dropped and tallied in
    /// `Snapshot::skipped`.
    pub fn collect(&self, cancel: &CancelToken) -> Result<Snapshot> {
        cancel.check()?;

        let sockets = self
            .process_utils
            .get_socket_table(cancel)
            .context("Failed to enumerate sockets")?;

        let identities = IdentityCache::new(self.process_utils.as_ref());
        let snapshot = aggregate(sockets, &identities, cancel)?;

        log::debug!(
            "Collected {} connection(s) across {} application(s), {} skipped",
            snapshot.connection_count(),
            snapshot.applications.len(),
            snapshot.skipped
        );

        Ok(snapshot)
    }

    /// Collect a Snapshot and enrichment counters side by side
    ///
    /// Enrichment never fails the call: any error there yields an empty map.
    pub fn collect_once(
        &self,
        netio: Option<&dyn NetIoBackend>,
        cancel: &CancelToken,
    ) -> Result<(Snapshot, NetIoMap)> {
        let (snapshot, stats) = std::thread::scope(|scope| {
            let enrichment = netio.map(|backend| {
                scope.spawn(move || match backend.collect(cancel) {
                    Ok(stats) => stats,
                    Err(e) => {
                        log::warn!("{} enrichment failed: {:#}", backend.name(), e);
                        NetIoMap::new()
                    }
                })
            });

            let snapshot = self.collect(cancel);

            let stats = match enrichment {
                Some(handle) => handle.join().unwrap_or_else(|_| {
                    log::warn!("Enrichment thread panicked");
                    NetIoMap::new()
                }),
                None => NetIoMap::new(),
            };

            (snapshot, stats)
        });

        Ok((snapshot?, stats))
    }
}

fn aggregate(
    sockets: Vec<SocketEntry>,
    identities: &IdentityCache<'_>,
    cancel: &CancelToken,
) -> Result<Snapshot, Error> {
    let mut applications: Vec<Application> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0;

    for socket in sockets {
        cancel.check()?;

        // Kernel-owned / unattributable
        if socket.pid == 0 {
            continue;
        }

        let Some(identity) = identities.resolve(socket.pid) else {
            skipped += 1;
            continue;
        };

        let index = *by_name.entry(identity.name.clone()).or_insert_with(|| {
            applications.push(Application::new(identity.name.clone(), None));
            applications.len() - 1
        });

        let app = &mut applications[index];
        if app.exe.is_none() {
            app.exe = identity.exe;
        }
        if !app.pids.contains(&socket.pid) {
            app.pids.push(socket.pid);
        }
        app.connections.push(to_connection(socket));
    }

    for app in &mut applications {
        app.pids.sort_unstable();
    }
    applications.sort_by(|a, b| {
        b.connection_count()
            .cmp(&a.connection_count())
            .then_with(|| a.name.cmp(&b.name))
    });

    Ok(Snapshot {
        created_at: Utc::now(),
        applications,
        skipped,
    })
}

fn to_connection(socket: SocketEntry) -> Connection {
    let (protocol, state) = match socket.kind {
        SocketKind::Stream => (Protocol::Tcp, socket.status),
        SocketKind::Datagram => (Protocol::Udp, ConnectionState::None),
        SocketKind::Other => (Protocol::Unknown, socket.status),
    };

    Connection {
        pid: socket.pid,
        protocol,
        local: socket.local,
        remote: socket.remote,
        state,
    }
}
