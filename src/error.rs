//! Error types for netkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using NetKvError
pub type Result<T> = std::result::Result<T, NetKvError>;

/// Unified error type for netkv operations
#[derive(Debug, Error)]
pub enum NetKvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Wire Errors
    // -------------------------------------------------------------------------
    /// Malformed or truncated message
    #[error("decode error: {0}")]
    Decode(String),

    /// Length prefix above the configured maximum
    #[error("message too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    /// Body data does not match its checksum
    #[error("bad checksum in message body")]
    BadChecksum,

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Failure reported by the peer in a FAIL response
    #[error("{0}")]
    Remote(String),

    // -------------------------------------------------------------------------
    // Server Lifecycle
    // -------------------------------------------------------------------------
    /// The accept loop observed a stop request
    #[error("listener stopped")]
    Stopped,

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("key not found")]
    KeyNotFound,

    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl NetKvError {
    /// True when the error means the peer went away between messages
    pub fn is_disconnect(&self) -> bool {
        match self {
            NetKvError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
