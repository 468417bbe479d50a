// macOS socket mapper backends

mod libproc;

pub use libproc::LibprocSocketMapper;

use super::SocketMapperBackend;
use super::lsof::LsofSocketMapper;
use crate::backends::BackendInfo;
use crate::error::Error;
use anyhow::Result;

/// Detect all available socket mapper backends on macOS
pub fn detect_socket_mappers() -> Vec<BackendInfo> {
    vec![
        BackendInfo {
            name: "libproc",
            priority: LibprocSocketMapper::PRIORITY,
            available: LibprocSocketMapper::is_available(),
        },
        BackendInfo {
            name: "lsof",
            priority: LsofSocketMapper::PRIORITY,
            available: LsofSocketMapper::is_available(),
        },
    ]
}

/// Select socket mapper backend for macOS
///
/// Priority order (if no preference specified):
/// 1. libproc (Best - native API, most efficient)
/// 2. lsof (Good - reliable but spawns external process)
pub fn select_socket_mapper(preference: Option<&str>) -> Result<Box<dyn SocketMapperBackend>> {
    if let Some(name) = preference {
        match name {
            "libproc" => Ok(Box::new(LibprocSocketMapper::new()?)),
            "lsof" => Ok(Box::new(LsofSocketMapper::new()?)),
            _ => Err(Error::NoSocketMapper(format!("unknown backend '{}'", name)).into()),
        }
    } else if LibprocSocketMapper::is_available() {
        Ok(Box::new(LibprocSocketMapper::new()?))
    } else if LsofSocketMapper::is_available() {
        Ok(Box::new(LsofSocketMapper::new()?))
    } else {
        Err(Error::NoSocketMapper("no backends available on macOS".to_string()).into())
    }
}
