// Typed failures that callers need to tell apart
//
// Everything else travels as a plain `anyhow::Error` with context attached.
// These variants are wrapped in `anyhow::Error` too; use
// `err.downcast_ref::<sockscope::Error>()` to inspect them.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The caller's cancellation token fired or its deadline passed.
    #[error("operation cancelled")]
    Cancelled,

    /// Kill was requested with a signal name that is not in the table.
    #[error("unknown signal: {0}")]
    UnknownSignal(String),

    /// One or more signal sends failed; all targets were still attempted.
    #[error("failed to signal {failed} of {total} target(s)")]
    KillFailed { failed: usize, total: usize },

    /// No usable socket enumeration backend.
    #[error("no socket mapper available: {0}")]
    NoSocketMapper(String),
}

impl Error {
    /// True when `err` (anywhere in its chain) is a cancellation.
    pub fn is_cancelled(err: &anyhow::Error) -> bool {
        err.chain()
            .any(|cause| matches!(cause.downcast_ref::<Error>(), Some(Error::Cancelled)))
    }
}
