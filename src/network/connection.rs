//! Connection Handler
//!
//! Handles individual client connections on stream transports.

use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, TcpStream};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::dispatcher::Dispatcher;
use crate::error::{NetKvError, Result};
use crate::storage::Store;

/// A connected stream socket (TCP or unix)
pub trait StreamSocket: Read + Write + Send + Sized + 'static {
    /// Second handle to the same socket
    fn try_clone(&self) -> io::Result<Self>;

    /// Per-transport socket options applied once after accept
    fn configure(&self) -> io::Result<()>;

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    fn shutdown(&self) -> io::Result<()>;

    /// Peer description for logging
    fn peer_label(&self) -> String;
}

impl StreamSocket for TcpStream {
    fn try_clone(&self) -> io::Result<Self> {
        TcpStream::try_clone(self)
    }

    fn configure(&self) -> io::Result<()> {
        // Disable Nagle's algorithm for low latency
        self.set_nodelay(true)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_write_timeout(self, timeout)
    }

    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }

    fn peer_label(&self) -> String {
        self.peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

#[cfg(unix)]
impl StreamSocket for UnixStream {
    fn try_clone(&self) -> io::Result<Self> {
        UnixStream::try_clone(self)
    }

    fn configure(&self) -> io::Result<()> {
        Ok(())
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        UnixStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        UnixStream::set_write_timeout(self, timeout)
    }

    fn shutdown(&self) -> io::Result<()> {
        UnixStream::shutdown(self, Shutdown::Both)
    }

    fn peer_label(&self) -> String {
        match self.peer_addr() {
            Ok(addr) => match addr.as_pathname() {
                Some(path) => format!("unix:{}", path.display()),
                None => "unix:unnamed".to_string(),
            },
            Err(_) => "unknown".to_string(),
        }
    }
}

/// Handles a single client connection
pub struct Connection<T: StreamSocket, S: Store + ?Sized> {
    /// Stream reader (buffered for efficiency)
    reader: BufReader<T>,

    /// Stream writer (buffered for efficiency)
    writer: BufWriter<T>,

    /// Executes each request against the store
    dispatcher: Dispatcher<S>,

    /// Peer address for logging
    peer_addr: String,
}

impl<T: StreamSocket, S: Store + ?Sized> Connection<T, S> {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O over two handles of the same socket
    pub fn new(stream: T, dispatcher: Dispatcher<S>) -> Result<Self> {
        let peer_addr = stream.peer_label();
        stream.configure()?;

        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            dispatcher,
            peer_addr,
        })
    }

    /// Configure connection timeouts (0 leaves a direction unbounded)
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Serves one request at a time, in arrival order. Returns when the
    /// client disconnects or a message cannot be decoded or written.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        let result = loop {
            match self.dispatcher.serve(&mut self.reader, &mut self.writer) {
                Ok(()) => continue,
                Err(e) if e.is_disconnect() => {
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    break Ok(());
                }
                Err(NetKvError::Io(ref e))
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    tracing::debug!("Read timeout for client {}", self.peer_addr);
                    break Ok(());
                }
                Err(e) => {
                    tracing::warn!("Closing connection to {}: {}", self.peer_addr, e);
                    break Err(e);
                }
            }
        };

        let _ = self.writer.get_ref().shutdown();
        result
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}
