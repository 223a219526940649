//! Error taxonomy shared by every component in this crate.
//!
//! Components return this discriminated result at their boundary; only
//! the RPC edge (in `procmem-mcp`) projects a variant to a JSON-RPC error
//! shape.

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the procedural memory core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// User input violates a contract (schema, naming grammar, config).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced entity is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A DAG mutation would introduce a cycle.
    #[error("Cycle would form")]
    Cycle,

    /// A deadline was exceeded.
    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// API-key authentication failed or was absent.
    #[error("Unauthorized")]
    Auth,

    /// Duplicate id with an incompatible kind, or an incompatible merge.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A required collaborator is absent (e.g. PER training without a
    /// trace store).
    #[error("Missing dependency: {0}")]
    Dependency(String),

    /// Serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else unexpected.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a caller may reasonably retry this operation.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Timeout(_) | Error::Dependency(_) | Error::Io(_) => true,
            Error::Validation(_)
            | Error::NotFound(_)
            | Error::Cycle
            | Error::Auth
            | Error::Conflict(_)
            | Error::Serialization(_)
            | Error::Internal(_) => false,
        }
    }

    /// Stable error code used when projecting to JSON-RPC.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Error::Validation(_) => -32602,
            Error::NotFound(_) => -32004,
            Error::Cycle => -32001,
            Error::Timeout(_) => -32002,
            Error::Auth => -32003,
            Error::Conflict(_) => -32005,
            Error::Dependency(_) => -32006,
            Error::Serialization(_) => -32700,
            Error::Io(_) => -32007,
            Error::Internal(_) => -32603,
        }
    }
}
