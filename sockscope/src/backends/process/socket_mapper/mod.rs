// Cross-platform socket-to-PID mapping backend system
//
// This module provides a trait-based abstraction for listing sockets with their
// owning process across operating systems:
// - Linux: procfs (/proc/net/tcp etc. joined with /proc/<pid>/fd), lsof
// - macOS: libproc, lsof

use super::SocketEntry;
use crate::backends::{BackendCapabilities, BackendPriority};
use crate::cancel::CancelToken;
use crate::model::Endpoint;
use anyhow::Result;
use std::net::SocketAddr;

/// Cross-platform socket-to-PID mapping backend trait
pub trait SocketMapperBackend: Send + Sync {
    /// Backend name (e.g., "procfs", "lsof", "libproc")
    fn name(&self) -> &'static str;

    /// Backend priority for auto-selection
    fn priority(&self) -> BackendPriority;

    /// Check if this backend is available on the current system
    fn is_available() -> bool
    where
        Self: Sized;

    /// Get backend capabilities
    fn capabilities(&self) -> BackendCapabilities;

    /// List every TCP/UDP socket (all address families) with its owning pid
    ///
    /// A failure of the underlying OS query is an error; sockets whose owner
    /// is unknown are returned with pid 0.
    fn get_socket_table(&self, cancel: &CancelToken) -> Result<Vec<SocketEntry>>;
}

/// Local side of a kernel socket address
pub fn local_endpoint(addr: SocketAddr) -> Endpoint {
    Endpoint::new(addr.ip().to_string(), addr.port())
}

/// Remote side of a kernel socket address; the all-zero address means "no peer"
pub fn remote_endpoint(addr: SocketAddr) -> Option<Endpoint> {
    if addr.ip().is_unspecified() && addr.port() == 0 {
        None
    } else {
        Some(Endpoint::new(addr.ip().to_string(), addr.port()))
    }
}

// lsof works the same way on every unix we support
pub mod lsof;

// Platform-specific modules
#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "macos")]
pub mod macos;

// Platform-specific re-exports and functions
#[cfg(target_os = "linux")]
pub use linux::{detect_socket_mappers, select_socket_mapper};

#[cfg(target_os = "macos")]
pub use macos::{detect_socket_mappers, select_socket_mapper};
