//! Error types for the outstation process database.

use thiserror::Error;

use crate::control::ControlStatus;

/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, DbError>;

/// Outstation database error types.
///
/// None of these are fatal. The worst outcome of any failed call is that
/// the operation did not take effect; the session layer turns the error
/// into a DNP3 status code with [`DbError::status`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    /// Fixed-size table or array is full
    #[error("Capacity exceeded: {what} holds at most {capacity} entries")]
    CapacityExceeded { what: &'static str, capacity: usize },

    /// Lookup by index, UUID or name failed
    #[error("Not found")]
    NotFound,

    /// Control mode not supported by the point
    #[error("Not supported")]
    NotSupported,

    /// Test harness override
    #[error("Test induced failure: {0:?}")]
    TestInducedFailure(ControlStatus),

    /// Freeze delay outside the representable timer range
    #[error("Invalid freeze interval: delay of {delay_ms} ms exceeds timer range")]
    InvalidInterval { delay_ms: u64 },

    /// Point or device is in local (manual override) mode
    #[error("Rejected: local mode")]
    LocalModeRejected,

    /// Control run would write past the end of a fixed array
    #[error("Too many operations")]
    TooManyOperations,

    /// Object group has no table or queue in this database
    #[error("Unknown object group: {0}")]
    UnknownGroup(u8),
}

impl DbError {
    /// Create a capacity error.
    pub fn capacity(what: &'static str, capacity: usize) -> Self {
        Self::CapacityExceeded { what, capacity }
    }

    /// Check if this error is a rejected select/operate.
    pub fn is_control_rejection(&self) -> bool {
        matches!(
            self,
            Self::NotSupported
                | Self::LocalModeRejected
                | Self::TestInducedFailure(_)
                | Self::TooManyOperations
        )
    }

    /// DNP3 control status reported back to the master.
    pub fn status(&self) -> ControlStatus {
        match self {
            Self::TestInducedFailure(status) => *status,
            Self::LocalModeRejected => ControlStatus::Local,
            Self::TooManyOperations => ControlStatus::TooManyOps,
            Self::CapacityExceeded { .. } => ControlStatus::TooManyOps,
            Self::NotFound | Self::UnknownGroup(_) => ControlStatus::NotSupported,
            Self::NotSupported => ControlStatus::NotSupported,
            Self::InvalidInterval { .. } => ControlStatus::FormatError,
        }
    }
}

/// Event record codec error types.
#[derive(Debug, Error)]
pub enum CodecError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record length field outside the accepted range
    #[error("Invalid record length: {len} (max {max})")]
    InvalidLength { len: usize, max: usize },

    /// Record body shorter than its fields
    #[error("Truncated record: {0} bytes")]
    Truncated(usize),

    /// Unknown event value tag
    #[error("Unknown value tag: {0}")]
    UnknownValueTag(u8),

    /// Record names a group without an event queue
    #[error("Invalid record: {0}")]
    Database(#[from] DbError),
}
