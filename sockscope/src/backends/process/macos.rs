// macOS-specific process utilities

use super::socket_mapper::{SocketMapperBackend, select_socket_mapper};
use super::{ProcessIdentity, ProcessUtils, SocketEntry};
use crate::cancel::CancelToken;
use crate::model::Pid;
use anyhow::Result;
use sysinfo::{Pid as SysPid, System};

/// macOS process utilities with pluggable socket mapping
pub struct MacOSProcessUtils {
    socket_mapper: Box<dyn SocketMapperBackend>,
}

impl MacOSProcessUtils {
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

impl ProcessUtils for MacOSProcessUtils {
    fn get_process_identity(&self, pid: Pid) -> Result<ProcessIdentity> {
        let name = libproc::libproc::proc_pid::name(pid)
            .map_err(|e| anyhow::anyhow!("Process {} not resolvable: {}", pid, e))?;

        if name.is_empty() {
            anyhow::bail!("PID {} has an empty command name", pid);
        }

        let exe = libproc::libproc::proc_pid::pidpath(pid).ok();

        Ok(ProcessIdentity { name, exe })
    }

    fn process_exists(&self, pid: Pid) -> bool {
        let sys = System::new_all();
        sys.process(SysPid::from_u32(pid as u32)).is_some()
    }

    fn get_socket_table(&self, cancel: &CancelToken) -> Result<Vec<SocketEntry>> {
        // Delegate to pluggable socket mapper backend
        self.socket_mapper.get_socket_table(cancel)
    }

    fn socket_mapper_name(&self) -> &'static str {
        self.socket_mapper.name()
    }
}
