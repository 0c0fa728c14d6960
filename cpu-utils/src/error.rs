//! Error types for CPU affinity and topology queries.

use {std::io, thiserror::Error};

/// Errors that can occur while querying CPU affinity or topology.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CpuAffinityError {
    /// I/O or system call error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Operation not supported on this platform
    #[error("CPU affinity operations are not supported on this platform")]
    NotSupported,

    /// Failed to parse CPU range or ID
    #[error("Failed to parse CPU specification: {0}")]
    ParseError(String),

    /// Neither procfs nor sysfs exposed socket and core identifiers
    #[error("CPU topology is unavailable: {0}")]
    TopologyUnavailable(String),
}
