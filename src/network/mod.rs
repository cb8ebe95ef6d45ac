//! Network Module
//!
//! Transports and the serving loop.
//!
//! ## Architecture
//! - Single acceptor thread polling a stoppable listener
//! - One worker thread per stream connection (unix, tcp)
//! - axum on a tokio runtime for http, one dispatch per request
//! - Requests routed through the Dispatcher

mod acceptor;
mod connection;
mod http;
mod server;

pub use acceptor::{PollingListener, StopSignal, StoppableListener};
pub use connection::{Connection, StreamSocket};
pub use http::router;
pub use server::NetworkServer;
