// Narrowed views of a Snapshot
//
// Both filters build a new Snapshot and leave the input untouched. Counts on
// Application are derived from its connection list, so trimming connections
// is enough to keep them consistent.

use crate::model::{Application, Pid, Snapshot};

/// Keep connections whose local or remote address ends with `:<port>`
pub fn filter_by_port(snapshot: &Snapshot, port: u16) -> Snapshot {
    let applications = snapshot
        .applications
        .iter()
        .filter_map(|app| {
            let connections: Vec<_> = app
                .connections
                .iter()
                .filter(|c| c.matches_port(port))
                .cloned()
                .collect();

            if connections.is_empty() {
                return None;
            }

            let pids = app
                .pids
                .iter()
                .copied()
                .filter(|pid| connections.iter().any(|c| c.pid == *pid))
                .collect();

            Some(Application {
                name: app.name.clone(),
                exe: app.exe.clone(),
                pids,
                connections,
            })
        })
        .collect();

    Snapshot {
        created_at: snapshot.created_at,
        applications,
        skipped: snapshot.skipped,
    }
}

/// Keep only the connections owned by `pid`
pub fn filter_by_pid(snapshot: &Snapshot, pid: Pid) -> Snapshot {
    let applications = snapshot
        .applications
        .iter()
        .filter(|app| app.pids.contains(&pid))
        .map(|app| Application {
            name: app.name.clone(),
            exe: app.exe.clone(),
            pids: vec![pid],
            connections: app
                .connections
                .iter()
                .filter(|c| c.pid == pid)
                .cloned()
                .collect(),
        })
        .collect();

    Snapshot {
        created_at: snapshot.created_at,
        applications,
        skipped: snapshot.skipped,
    }
}
