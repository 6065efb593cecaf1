//! Error types for the plugin ABI.

use thiserror::Error;

/// Errors that can occur while marshaling parameters or describing classes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbiError {
    /// Parameter index beyond the populated size of a record.
    #[error("Parameter index {index} is out of bounds ({size})")]
    IndexOutOfBounds { index: usize, size: usize },

    /// Unknown or mismatched parameter type tag.
    #[error("Invalid parameter type: {0}")]
    InvalidType(i32),

    /// A record, plugin table or other bounded collection is full.
    #[error("Capacity exceeded: {what} (max {max})")]
    CapacityExceeded { what: &'static str, max: usize },

    /// The return slot was already written.
    #[error("Return value already set")]
    ReturnAlreadySet,

    /// A string crossing the C boundary was not valid.
    #[error("Invalid string: {0}")]
    InvalidString(String),

    /// A plugin, class or method was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A method was called with a different number of arguments than declared.
    #[error("Method '{method}' expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        method: String,
        expected: usize,
        actual: usize,
    },

    /// A native callback reported failure.
    #[error("Method '{method}' failed with status {status}")]
    CallbackFailed { method: String, status: i32 },

    /// A native callback returned success without populating the return slot.
    #[error("Method '{0}' returned without a value")]
    MissingReturn(String),
}

/// Result type for ABI operations.
pub type AbiResult<T> = std::result::Result<T, AbiError>;
