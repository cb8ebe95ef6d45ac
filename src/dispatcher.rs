//! Dispatcher Module
//!
//! Turns one decoded request into one response against the store.
//!
//! ## Responsibilities
//! - Decode a request, encode its response (once per message)
//! - Route GET/PUT/DELETE to the store
//! - Map protocol and storage failures to FAIL responses

use std::io::{Read, Write};
use std::sync::Arc;

use crate::error::{NetKvError, Result};
use crate::protocol::{Command, MessageCodec, Request, Response};
use crate::storage::Store;

/// FAIL message for a request without id
pub const NO_ID_MESSAGE: &str = "no id in request";

/// FAIL message for a PUT without a valid body
pub const BAD_DATA_MESSAGE: &str = "bad data in request";

/// FAIL message for a body whose checksum does not match
pub const BAD_CHECKSUM_MESSAGE: &str = "bad checksum in request body";

/// FAIL message for a missing or unknown command
pub const UNSUPPORTED_COMMAND_MESSAGE: &str = "unsupported command";

/// Executes requests against a shared store
///
/// Cheap to clone; every clone shares the same store.
pub struct Dispatcher<S: Store + ?Sized> {
    store: Arc<S>,
    codec: MessageCodec,
}

impl<S: Store + ?Sized> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            codec: self.codec,
        }
    }
}

impl<S: Store + ?Sized> Dispatcher<S> {
    pub fn new(store: Arc<S>, codec: MessageCodec) -> Self {
        Self { store, codec }
    }

    pub fn codec(&self) -> &MessageCodec {
        &self.codec
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Serve exactly one message
    ///
    /// Reads one request from `reader` and writes one response to
    /// `writer`. Returns an error only when no response can be attributed
    /// (decode or transport failure) or the response could not be written;
    /// callers end the connection on error.
    pub fn serve<R, W>(&self, reader: &mut R, writer: &mut W) -> Result<()>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let response = match self.codec.read_request(reader) {
            Ok(request) => {
                tracing::trace!(
                    "Request {:?} for key of {} bytes",
                    request.command,
                    request.id.len()
                );
                self.handle(request)
            }
            Err(NetKvError::BadChecksum) => Response::fail(BAD_CHECKSUM_MESSAGE),
            Err(e) => return Err(e),
        };

        self.codec.write_response(writer, response)
    }

    /// Execute a request and build its response
    pub fn handle(&self, request: Request) -> Response {
        if request.id.is_empty() {
            return Response::fail(NO_ID_MESSAGE);
        }

        let response = match request.command {
            Some(Command::Get) => match self.store.get(&request.id) {
                Ok(value) => Response::ok(Some(value)),
                Err(e) => Response::fail(&e.to_string()),
            },
            Some(Command::Put) => self.put(&request),
            Some(Command::Delete) => match self.store.delete(&request.id) {
                Ok(()) => Response::ok(None),
                Err(e) => Response::fail(&e.to_string()),
            },
            Some(Command::Unsupported(_)) | None => Response::fail(UNSUPPORTED_COMMAND_MESSAGE),
        };

        response.with_id(&request.id)
    }

    /// PUT is only attempted with a present, valid body
    fn put(&self, request: &Request) -> Response {
        let body = match &request.body {
            Some(body) if body.validate() => body,
            _ => return Response::fail(BAD_DATA_MESSAGE),
        };

        let value = body.data.as_deref().unwrap_or_default();
        match self.store.put(&request.id, value) {
            Ok(()) => Response::ok(None),
            Err(e) => Response::fail(&e.to_string()),
        }
    }
}
