// Per-process network I/O enrichment backends
//
// Enrichment is optional: a missing tool or a permission problem yields an
// empty map, never an error. Only cancellation and unexpected failures are
// returned as errors, and `collect_once` swallows those too.

use super::{BackendInfo, BackendPriority};
use crate::cancel::CancelToken;
use crate::model::NetIoMap;
use anyhow::Result;

pub mod nettop;
#[cfg(target_os = "linux")]
pub mod procnet;

pub use nettop::NettopCollector;
#[cfg(target_os = "linux")]
pub use procnet::ProcNetCollector;

/// Per-process byte counter backend trait
pub trait NetIoBackend: Send + Sync {
    /// Backend name (e.g., "nettop", "procnet")
    fn name(&self) -> &'static str;

    /// Backend priority for auto-selection
    fn priority(&self) -> BackendPriority;

    /// Check if this backend is available on the current system
    fn is_available() -> bool
    where
        Self: Sized;

    /// Sample cumulative byte counters keyed by pid
    fn collect(&self, cancel: &CancelToken) -> Result<NetIoMap>;
}

/// Detect all enrichment backends compiled in for this platform
pub fn detect_netio_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(target_os = "linux")]
    backends.push(BackendInfo {
        name: "procnet",
        priority: ProcNetCollector::PRIORITY,
        available: ProcNetCollector::is_available(),
    });

    backends.push(BackendInfo {
        name: "nettop",
        priority: NettopCollector::PRIORITY,
        available: NettopCollector::is_available(),
    });

    backends
}

/// Select an enrichment backend, or `None` when nothing usable exists
pub fn select_netio_backend(preference: Option<&str>) -> Option<Box<dyn NetIoBackend>> {
    let name = match preference {
        Some(name) => name,
        None => detect_netio_backends()
            .into_iter()
            .filter(|b| b.available)
            .max_by_key(|b| b.priority)?
            .name,
    };

    match name {
        #[cfg(target_os = "linux")]
        "procnet" => Some(Box::new(ProcNetCollector)),
        "nettop" => Some(Box::new(NettopCollector)),
        _ => {
            log::warn!("Unknown enrichment backend: {}", name);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_preference_yields_none() {
        assert!(select_netio_backend(Some("telepathy")).is_none());
    }

    #[test]
    fn test_explicit_preference_is_honored() {
        let backend = select_netio_backend(Some("nettop")).unwrap();
        assert_eq!(backend.name(), "nettop");
    }

    #[test]
    fn test_detected_priority_matches_backend() {
        for info in detect_netio_backends() {
            let backend = select_netio_backend(Some(info.name)).unwrap();
            assert_eq!(backend.priority(), info.priority, "{}", info.name);
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_auto_selects_procnet() {
        let backend = select_netio_backend(None).unwrap();
        assert_eq!(backend.name(), "procnet");
    }
}
