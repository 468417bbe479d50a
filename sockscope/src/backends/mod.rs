// Backend trait support types and the pluggable platform backends

pub mod command;
pub mod netio;
pub mod process;

/// Backend priority ranking (higher = better)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BackendPriority {
    Fallback = 1, // Works but limited (external tool parsing)
    Good = 2,     // Solid implementation
    Better = 3,   // Modern, efficient
    Best = 4,     // Native APIs
}

/// Capabilities that a backend supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackendCapabilities {
    pub ipv4_support: bool,
    pub ipv6_support: bool,
    pub per_process: bool,
    pub per_connection: bool,
}

impl BackendCapabilities {
    /// Short human summary, e.g. "ipv4 ipv6 per-process"
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.ipv4_support {
            parts.push("ipv4");
        }
        if self.ipv6_support {
            parts.push("ipv6");
        }
        if self.per_process {
            parts.push("per-process");
        }
        if self.per_connection {
            parts.push("per-connection");
        }
        if parts.is_empty() {
            "-".to_string()
        } else {
            parts.join(" ")
        }
    }
}

/// Backend metadata for selection and `--list-backends`
#[derive(Debug, Clone)]
pub struct BackendInfo {
    pub name: &'static str,
    pub priority: BackendPriority,
    pub available: bool,
}
