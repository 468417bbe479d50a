// Linux socket mapper backends

mod procfs;

pub use procfs::ProcfsSocketMapper;

use super::SocketMapperBackend;
use super::lsof::LsofSocketMapper;
use crate::backends::BackendInfo;
use crate::error::Error;
use anyhow::Result;

/// Detect all available socket mapper backends on Linux
pub fn detect_socket_mappers() -> Vec<BackendInfo> {
    vec![
        BackendInfo {
            name: "procfs",
            priority: ProcfsSocketMapper::PRIORITY,
            available: ProcfsSocketMapper::is_available(),
        },
        BackendInfo {
            name: "lsof",
            priority: LsofSocketMapper::PRIORITY,
            available: LsofSocketMapper::is_available(),
        },
    ]
}

/// Select socket mapper backend for Linux
///
/// Priority order (if no preference specified):
/// 1. procfs (Best - reads the kernel tables directly)
/// 2. lsof (Fallback - spawns an external process)
pub fn select_socket_mapper(preference: Option<&str>) -> Result<Box<dyn SocketMapperBackend>> {
    if let Some(name) = preference {
        match name {
            "procfs" => Ok(Box::new(ProcfsSocketMapper::new()?)),
            "lsof" => Ok(Box::new(LsofSocketMapper::new()?)),
            _ => Err(Error::NoSocketMapper(format!("unknown backend '{}'", name)).into()),
        }
    } else if ProcfsSocketMapper::is_available() {
        Ok(Box::new(ProcfsSocketMapper::new()?))
    } else if LsofSocketMapper::is_available() {
        Ok(Box::new(LsofSocketMapper::new()?))
    } else {
        Err(Error::NoSocketMapper("no backends available on Linux".to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_preference_is_rejected() {
        let err = select_socket_mapper(Some("carrier-pigeon")).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::NoSocketMapper(_))
        ));
    }

    #[test]
    fn test_detected_priority_matches_backend() {
        for info in detect_socket_mappers() {
            // lsof may not be installed on the test host
            if let Ok(mapper) = select_socket_mapper(Some(info.name)) {
                assert_eq!(mapper.priority(), info.priority, "{}", info.name);
            }
        }
        let lsof = detect_socket_mappers()
            .into_iter()
            .find(|info| info.name == "lsof")
            .unwrap();
        assert_eq!(lsof.priority, crate::backends::BackendPriority::Fallback);
    }

    #[test]
    fn test_procfs_is_preferred() {
        let mapper = select_socket_mapper(None).unwrap();
        assert_eq!(mapper.name(), "procfs");
        assert!(detect_socket_mappers()[0].available);
    }
}
