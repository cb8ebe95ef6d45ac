//! Network Server
//!
//! Binds the configured transport and serves every connection.

use std::net::TcpListener;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::config::{Config, Network};
use crate::dispatcher::Dispatcher;
use crate::error::{NetKvError, Result};
use crate::protocol::MessageCodec;
use crate::storage::Store;

use super::acceptor::{PollingListener, StopSignal, StoppableListener};
use super::connection::{Connection, StreamSocket};
use super::http;

/// Pause after a failed accept before trying again
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Server for one transport
///
/// `listen_and_serve` blocks the calling thread; `stop` may be called from
/// any other thread. Each instance owns its own stop signal.
pub struct NetworkServer {
    config: Config,
    stop: StopSignal,
    bound: Mutex<Option<String>>,
    bound_cv: Condvar,
    next_conn_id: AtomicU64,
}

impl NetworkServer {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            stop: StopSignal::new(),
            bound: Mutex::new(None),
            bound_cv: Condvar::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bind and serve until stopped
    ///
    /// Returns `Err(NetKvError::Stopped)` after a graceful stop; any other
    /// error means the transport could not be bound or served. Connections
    /// already accepted keep running until their clients leave.
    pub fn listen_and_serve<S: Store + ?Sized>(&self, store: Arc<S>) -> Result<()> {
        let dispatcher = Dispatcher::new(store, MessageCodec::from_config(&self.config));

        match self.config.network {
            Network::Tcp => {
                let listener = TcpListener::bind(&self.config.host)?;
                self.set_bound(listener.local_addr()?.to_string());
                self.serve_stream(listener, dispatcher)
            }
            Network::Unix => self.serve_unix(dispatcher),
            Network::Http => {
                let listener = TcpListener::bind(&self.config.host)?;
                let addr = listener.local_addr()?.to_string();
                tracing::info!(
                    "Listening on {} (http, {})",
                    addr,
                    self.config.encoding
                );
                self.set_bound(addr);
                let result = http::serve(
                    listener,
                    dispatcher,
                    self.stop.clone(),
                    self.config.accept_poll_interval,
                );
                tracing::info!("HTTP server on {} stopped", self.config.host);
                result
            }
        }
    }

    /// Ask the accept loop to stop; idempotent and thread-safe
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Address actually bound, once listening
    ///
    /// For tcp and http this resolves port 0 to the assigned port.
    pub fn local_addr(&self) -> Option<String> {
        self.bound.lock().clone()
    }

    /// Block until the server is bound or `timeout` passes
    pub fn wait_bound(&self, timeout: Duration) -> Option<String> {
        let mut bound = self.bound.lock();
        self.bound_cv
            .wait_while_for(&mut bound, |bound| bound.is_none(), timeout);
        bound.clone()
    }

    fn set_bound(&self, addr: String) {
        *self.bound.lock() = Some(addr);
        self.bound_cv.notify_all();
    }

    // =========================================================================
    // Stream Transports
    // =========================================================================

    #[cfg(unix)]
    fn serve_unix<S: Store + ?Sized>(&self, dispatcher: Dispatcher<S>) -> Result<()> {
        let path = Path::new(&self.config.host);
        remove_stale_socket(path)?;

        let listener = UnixListener::bind(path)?;
        self.set_bound(self.config.host.clone());
        let result = self.serve_stream(listener, dispatcher);

        if let Err(e) = std::fs::remove_file(path) {
            tracing::debug!("Could not remove socket {}: {}", path.display(), e);
        }
        result
    }

    #[cfg(not(unix))]
    fn serve_unix<S: Store + ?Sized>(&self, _dispatcher: Dispatcher<S>) -> Result<()> {
        Err(NetKvError::Config(
            "unix sockets are not supported on this platform".to_string(),
        ))
    }

    /// Accept loop shared by tcp and unix
    fn serve_stream<L, S>(&self, listener: L, dispatcher: Dispatcher<S>) -> Result<()>
    where
        L: PollingListener,
        L::Stream: StreamSocket,
        S: Store + ?Sized,
    {
        let listener = StoppableListener::new(
            listener,
            self.stop.clone(),
            self.config.accept_poll_interval,
        )?;
        tracing::info!(
            "Listening on {} ({}, {})",
            self.config.host,
            self.config.network,
            self.config.encoding
        );

        loop {
            match listener.accept() {
                Ok(stream) => self.spawn_worker(stream, dispatcher.clone()),
                Err(NetKvError::Stopped) => {
                    tracing::info!("Listener on {} stopped", self.config.host);
                    return Err(NetKvError::Stopped);
                }
                Err(e) => {
                    tracing::warn!("Error on accept stream socket: {}", e);
                    thread::sleep(ACCEPT_ERROR_BACKOFF);
                }
            }
        }
    }

    /// One worker thread per connection
    fn spawn_worker<T: StreamSocket, S: Store + ?Sized>(&self, stream: T, dispatcher: Dispatcher<S>) {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let read_ms = self.config.read_timeout_ms;
        let write_ms = self.config.write_timeout_ms;

        let spawned = thread::Builder::new()
            .name(format!("netkv-conn-{}", conn_id))
            .spawn(move || {
                let outcome = Connection::new(stream, dispatcher).and_then(|mut conn| {
                    conn.set_timeouts(read_ms, write_ms)?;
                    conn.handle()
                });
                if let Err(e) = outcome {
                    tracing::debug!("Connection {} ended with error: {}", conn_id, e);
                }
            });

        if let Err(e) = spawned {
            tracing::warn!("Failed to spawn worker for connection {}: {}", conn_id, e);
        }
    }
}

/// Remove a socket file left behind by a dead server
#[cfg(unix)]
fn remove_stale_socket(path: &Path) -> Result<()> {
    use std::os::unix::fs::FileTypeExt;

    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(_) => return Ok(()),
    };
    if !metadata.file_type().is_socket() {
        return Ok(());
    }
    if UnixStream::connect(path).is_ok() {
        return Err(NetKvError::Config(format!(
            "socket {} is in use by a running server",
            path.display()
        )));
    }

    tracing::debug!("Removing stale socket {}", path.display());
    std::fs::remove_file(path)?;
    Ok(())
}
