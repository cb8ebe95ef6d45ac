//! Stoppable Acceptor
//!
//! Wraps a bound listener so the accept loop can be told to stop.
//!
//! Accepts are attempted under a short deadline; every time the deadline
//! passes the stop signal is checked, so a stop request is observed within
//! one poll interval without closing the listener under a blocked accept.

use std::io;
use std::net::{TcpListener, TcpStream};
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use crate::error::{NetKvError, Result};

/// Longest nap between two accept attempts
const ACCEPT_NAP: Duration = Duration::from_millis(10);

// =============================================================================
// Stop Signal
// =============================================================================

/// Stop request shared by one server instance and its listener
///
/// Modeled as a channel nobody sends on; stopping drops the only sender,
/// which every receiver observes as a disconnect.
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

struct StopInner {
    sender: Mutex<Option<Sender<()>>>,
    receiver: Receiver<()>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (sender, receiver) = channel::bounded(0);
        Self {
            inner: Arc::new(StopInner {
                sender: Mutex::new(Some(sender)),
                receiver,
            }),
        }
    }

    /// Request a stop; later calls do nothing
    pub fn stop(&self) {
        self.inner.sender.lock().take();
    }

    /// Non-blocking check
    pub fn is_stopped(&self) -> bool {
        matches!(
            self.inner.receiver.try_recv(),
            Err(TryRecvError::Disconnected)
        )
    }

    /// Wait up to `timeout` for a stop; true if stopped
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(
            self.inner.receiver.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

// =============================================================================
// Polling Listener
// =============================================================================

/// A listener whose accepts can be bounded by a deadline
///
/// Only listeners that can switch to non-blocking mode qualify; accepted
/// streams are handed back in blocking mode.
pub trait PollingListener {
    type Stream;

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;

    /// One accept attempt; `WouldBlock` when nothing is pending
    fn try_accept(&self) -> io::Result<Self::Stream>;
}

impl PollingListener for TcpListener {
    type Stream = TcpStream;

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        TcpListener::set_nonblocking(self, nonblocking)
    }

    fn try_accept(&self) -> io::Result<TcpStream> {
        let (stream, _) = self.accept()?;
        stream.set_nonblocking(false)?;
        Ok(stream)
    }
}

#[cfg(unix)]
impl PollingListener for UnixListener {
    type Stream = UnixStream;

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        UnixListener::set_nonblocking(self, nonblocking)
    }

    fn try_accept(&self) -> io::Result<UnixStream> {
        let (stream, _) = self.accept()?;
        stream.set_nonblocking(false)?;
        Ok(stream)
    }
}

// =============================================================================
// Stoppable Listener
// =============================================================================

/// Listener wrapper with states Accepting → Stopped
pub struct StoppableListener<L: PollingListener> {
    listener: L,
    stop: StopSignal,
    poll_interval: Duration,
}

impl<L: PollingListener> StoppableListener<L> {
    /// Wrap `listener`
    ///
    /// Fails if the listener cannot be put in non-blocking mode, since
    /// accept deadlines are impossible without it.
    pub fn new(listener: L, stop: StopSignal, poll_interval: Duration) -> Result<Self> {
        listener.set_nonblocking(true).map_err(|e| {
            NetKvError::Config(format!("listener does not support accept deadlines: {}", e))
        })?;

        Ok(Self {
            listener,
            stop,
            poll_interval,
        })
    }

    /// Wait for the next connection
    ///
    /// Returns `NetKvError::Stopped` once a stop was requested, even if a
    /// connection was accepted in the same round.
    pub fn accept(&self) -> Result<L::Stream> {
        loop {
            let deadline = Instant::now() + self.poll_interval;
            let attempt = self.accept_before(deadline);

            if self.stop.is_stopped() {
                return Err(NetKvError::Stopped);
            }

            match attempt {
                Ok(stream) => return Ok(stream),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Poll for a connection until `deadline`
    fn accept_before(&self, deadline: Instant) -> io::Result<L::Stream> {
        loop {
            match self.listener.try_accept() {
                Ok(stream) => return Ok(stream),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "accept deadline"));
            }

            // Napping on the stop channel wakes us as soon as a stop lands
            if self.stop.wait_timeout(ACCEPT_NAP.min(deadline - now)) {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "stop requested"));
            }
        }
    }

    /// Request a stop; idempotent
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn get_ref(&self) -> &L {
        &self.listener
    }
}
