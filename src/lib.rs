//! # netkv
//!
//! A network key-value server with:
//! - Unix socket, TCP and HTTP transports
//! - Two wire encodings (JSON and length-prefixed binary)
//! - CRC-32 checksums on every message body
//! - Graceful, bounded-latency shutdown of the accept loop
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Network Server                            │
//! │     (unix / tcp: thread per connection, http: axum)          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ raw bytes
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   Message Codec                              │
//! │          (json | binary, checksum stamp/validate)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Request / Response
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Dispatcher                                │
//! │               (GET / PUT / DELETE)                           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!                       ▼
//!                ┌─────────────┐
//!                │    Store    │
//!                │ (mem | log) │
//!                └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod client;
pub mod dispatcher;
pub mod network;
pub mod protocol;
pub mod storage;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use client::Client;
pub use config::{Config, Network};
pub use dispatcher::Dispatcher;
pub use error::{NetKvError, Result};
pub use network::NetworkServer;
pub use protocol::{Encoding, MessageCodec};
pub use storage::{LogStore, MemoryStore, Store};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of netkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
