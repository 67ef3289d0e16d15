use std::io;

/// Failures surfaced by the fallible OSK operations.
///
/// Locks, atomics and wait queues cannot fail and do not use this type.
#[derive(Debug, thiserror::Error)]
pub enum OskError {
    #[error("failed to spawn host thread `{name}`: {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("work queue `{0}` has been shut down")]
    QueueClosed(String),
    #[error("address {0:#x} is not page aligned")]
    Unaligned(u64),
    #[error("invalid range {start:#x}..{end:#x}")]
    InvalidRange { start: u64, end: u64 },
    #[error("host memory information unavailable: {0}")]
    MemInfoUnavailable(&'static str),
}

pub type Result<T, E = OskError> = core::result::Result<T, E>;
