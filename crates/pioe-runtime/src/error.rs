//! Error types for the pioe host runtime.

use pioe_abi::AbiError;
use std::path::PathBuf;
use thiserror::Error;

/// Contract-level classification of a [`HostError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing file, or no engine matches a script suffix.
    NotFound,
    /// Failed dynamic load or missing exported symbol.
    LoadError,
    /// An operation that needs at least one engine ran on an empty registry.
    NoEngineAvailable,
    OutOfMemory,
    /// Unknown or mismatched parameter tag.
    InvalidType,
    /// Task or lock creation failure.
    ThreadError,
    /// An engine entry point returned a non-zero status.
    EngineFailure,
    Io,
}

/// Errors that can occur in the pioe host runtime.
#[derive(Error, Debug)]
pub enum HostError {
    /// File or engine not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The shared library could not be opened or bound.
    #[error("Failed to load engine {path}: {reason}")]
    LoadFailed { path: PathBuf, reason: String },

    /// The shared library does not export a required entry point.
    #[error("Could not load symbol {symbol} from {path}")]
    MissingSymbol { path: PathBuf, symbol: String },

    /// No engine is loaded.
    #[error("No engine available")]
    NoEngineAvailable,

    /// An allocation could not be satisfied.
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// A frame task or lock could not be created.
    #[error("Thread error: {0}")]
    Thread(String),

    /// An engine entry point reported failure.
    #[error("Engine {engine}: {entry} failed with status {status}")]
    Engine {
        engine: String,
        entry: &'static str,
        status: i32,
    },

    /// One or more engines failed during a best-effort fan-out.
    #[error("{} engine(s) failed in {entry}", .failures.len())]
    FanOut {
        entry: &'static str,
        failures: Vec<HostError>,
    },

    /// Plugin ABI error.
    #[error(transparent)]
    Abi(#[from] AbiError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HostError::NotFound(_) => ErrorKind::NotFound,
            HostError::LoadFailed { .. } | HostError::MissingSymbol { .. } => ErrorKind::LoadError,
            HostError::NoEngineAvailable => ErrorKind::NoEngineAvailable,
            HostError::OutOfMemory(_) => ErrorKind::OutOfMemory,
            HostError::Thread(_) => ErrorKind::ThreadError,
            HostError::Engine { .. } | HostError::FanOut { .. } => ErrorKind::EngineFailure,
            HostError::Abi(AbiError::InvalidType(_)) => ErrorKind::InvalidType,
            HostError::Abi(AbiError::NotFound(_)) => ErrorKind::NotFound,
            HostError::Abi(AbiError::CapacityExceeded { .. }) => ErrorKind::OutOfMemory,
            HostError::Abi(_) => ErrorKind::InvalidType,
            HostError::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the process must terminate after reporting this error.
    ///
    /// Out-of-memory, a missing required plugin symbol and task or lock
    /// creation failure are never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HostError::OutOfMemory(_) | HostError::MissingSymbol { .. } | HostError::Thread(_)
        )
    }
}

/// Result type for host operations.
pub type HostResult<T> = std::result::Result<T, HostError>;
