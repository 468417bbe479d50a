// Process utilities trait for platform-specific operations
//
// This module provides a platform-agnostic interface for the process-related
// operations that vary across operating systems: resolving a pid to a name,
// checking liveness, and listing every socket together with its owner.

use crate::cancel::CancelToken;
use crate::model::{ConnectionState, Endpoint, Pid};
use anyhow::Result;

/// Platform-agnostic process utilities interface
pub trait ProcessUtils: Send + Sync {
    /// Resolve a pid to its display name and executable path
    fn get_process_identity(&self, pid: Pid) -> Result<ProcessIdentity>;

    /// Check if process exists
    fn process_exists(&self, pid: Pid) -> bool;

    /// List every TCP/UDP socket with its owning pid (0 when unowned)
    fn get_socket_table(&self, cancel: &CancelToken) -> Result<Vec<SocketEntry>>;

    /// Name of the socket mapper backend in use
    fn socket_mapper_name(&self) -> &'static str;
}

/// Name and executable path of a live process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub name: String,
    /// Absent when the path is unreadable (e.g. another user's process)
    pub exe: Option<String>,
}

/// Socket type as the OS reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketKind {
    Stream,
    Datagram,
    Other,
}

/// One raw socket from the OS, before identity resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEntry {
    pub pid: Pid,
    pub kind: SocketKind,
    pub local: Endpoint,
    pub remote: Option<Endpoint>,
    pub status: ConnectionState,
}

// Socket mapper backend system (cross-platform)
pub mod socket_mapper;

// Platform-specific implementations
#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::LinuxProcessUtils;

#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "macos")]
pub use macos::MacOSProcessUtils;

/// Factory function to create platform-specific ProcessUtils
///
/// Exactly one implementation is compiled in per target OS. The socket mapper
/// preference picks among that platform's enumeration backends.
pub fn create_process_utils(
    socket_mapper_preference: Option<&str>,
) -> Result<Box<dyn ProcessUtils>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(LinuxProcessUtils::with_socket_mapper(
            socket_mapper_preference,
        )?))
    }

    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(MacOSProcessUtils::with_socket_mapper(
            socket_mapper_preference,
        )?))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        compile_error!("Unsupported platform - only Linux and macOS are currently supported");
    }
}
