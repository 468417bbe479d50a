// Linux-specific process utilities using procfs

use super::socket_mapper::{SocketMapperBackend, select_socket_mapper};
use super::{ProcessIdentity, ProcessUtils, SocketEntry};
use crate::cancel::CancelToken;
use crate::model::Pid;
use anyhow::{Context, Result};
use procfs::process::Process;

/// Linux process utilities with pluggable socket mapping
pub struct LinuxProcessUtils {
    socket_mapper: Box<dyn SocketMapperBackend>,
}

impl LinuxProcessUtils {
    pub fn new() -> Result<Self> {
        Self::with_socket_mapper(None)
    }

    /// Create with a specific socket mapper backend
    pub fn with_socket_mapper(backend_name: Option<&str>) -> Result<Self> {
        let socket_mapper = select_socket_mapper(backend_name)?;

        log::debug!("Using socket mapper backend: {}", socket_mapper.name());

        Ok(Self { socket_mapper })
    }
}

impl ProcessUtils for LinuxProcessUtils {
    fn get_process_identity(&self, pid: Pid) -> Result<ProcessIdentity> {
        let process = Process::new(pid).with_context(|| format!("No such process: {}", pid))?;
        let name = process
            .stat()
            .with_context(|| format!("Failed to read stat for PID {}", pid))?
            .comm;

        if name.is_empty() {
            anyhow::bail!("PID {} has an empty command name", pid);
        }

        // exe is unreadable for other users' processes without privileges
        let exe = process.exe().ok().map(|p| p.display().to_string());

        Ok(ProcessIdentity { name, exe })
    }

    fn process_exists(&self, pid: Pid) -> bool {
        Process::new(pid).is_ok()
    }

    fn get_socket_table(&self, cancel: &CancelToken) -> Result<Vec<SocketEntry>> {
        // Delegate to pluggable socket mapper backend
        self.socket_mapper.get_socket_table(cancel)
    }

    fn socket_mapper_name(&self) -> &'static str {
        self.socket_mapper.name()
    }
}
