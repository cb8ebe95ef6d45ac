//! Protocol codec
//!
//! Reads and writes messages in the deployment's wire encoding.
//!
//! ## Wire Formats
//!
//! ### Json
//! One JSON object per message, followed by a newline. Byte fields are
//! base64 strings:
//! ```text
//! {"id":"aGk=","command":1,"body":{"data":"b2s=","checksum":2044517703}}
//! ```
//!
//! ### Binary
//! ```text
//! ┌──────────────┬─────────────────────────────────┐
//! │ Len (4, LE)  │      bincode message (Len)      │
//! └──────────────┴─────────────────────────────────┘
//! ```

use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{Config, DEFAULT_MAX_MESSAGE_SIZE};
use crate::error::{NetKvError, Result};

use super::checksum;
use super::{Request, Response};

/// Length prefix size of a binary frame
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Wire encoding of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Self-describing JSON, one object per message
    Json,

    /// 4-byte little-endian length prefix + bincode
    Binary,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::Binary => "binary",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = NetKvError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" | "text" => Ok(Encoding::Json),
            "binary" | "bincode" | "protobuf" => Ok(Encoding::Binary),
            other => Err(NetKvError::Config(format!(
                "unsupported format '{}' (expected json or binary)",
                other
            ))),
        }
    }
}

/// Encodes and decodes messages in one encoding
///
/// Every body is stamped right before it is written and validated right
/// after it is read, in both directions.
#[derive(Debug, Clone, Copy)]
pub struct MessageCodec {
    encoding: Encoding,
    max_message_size: usize,
}

impl MessageCodec {
    pub fn new(encoding: Encoding, max_message_size: usize) -> Self {
        Self {
            encoding,
            max_message_size,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.encoding, config.max_message_size)
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    // =========================================================================
    // Server Side
    // =========================================================================

    /// Read one request
    ///
    /// A body whose checksum does not match is reported as `BadChecksum`,
    /// separately from structural decode errors.
    pub fn read_request<R: Read + ?Sized>(&self, reader: &mut R) -> Result<Request> {
        let request: Request = self.read_message(reader)?;
        if !checksum::validate(request.body.as_ref()) {
            return Err(NetKvError::BadChecksum);
        }
        Ok(request)
    }

    /// Stamp and write one response
    pub fn write_response<W: Write + ?Sized>(
        &self,
        writer: &mut W,
        mut response: Response,
    ) -> Result<()> {
        checksum::stamp(response.body.as_mut());
        self.write_message(writer, &response)
    }

    // =========================================================================
    // Client Side
    // =========================================================================

    /// Stamp and write one request
    pub fn write_request<W: Write + ?Sized>(&self, writer: &mut W, mut request: Request) -> Result<()> {
        checksum::stamp(request.body.as_mut());
        self.write_message(writer, &request)
    }

    /// Read one response, validating its body
    pub fn read_response<R: Read + ?Sized>(&self, reader: &mut R) -> Result<Response> {
        let response: Response = self.read_message(reader)?;
        if !checksum::validate(response.body.as_ref()) {
            return Err(NetKvError::BadChecksum);
        }
        Ok(response)
    }

    // =========================================================================
    // Encoding Dispatch
    // =========================================================================

    fn read_message<T, R>(&self, reader: &mut R) -> Result<T>
    where
        T: DeserializeOwned,
        R: Read + ?Sized,
    {
        match self.encoding {
            Encoding::Json => read_json(reader, self.max_message_size),
            Encoding::Binary => read_frame(reader, self.max_message_size),
        }
    }

    fn write_message<T, W>(&self, writer: &mut W, message: &T) -> Result<()>
    where
        T: Serialize,
        W: Write + ?Sized,
    {
        match self.encoding {
            Encoding::Json => write_json(writer, message)?,
            Encoding::Binary => write_frame(writer, message)?,
        }
        writer.flush()?;
        Ok(())
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(Encoding::Json, DEFAULT_MAX_MESSAGE_SIZE)
    }
}

// =============================================================================
// Json
// =============================================================================

fn read_json<T, R>(reader: &mut R, max_message_size: usize) -> Result<T>
where
    T: DeserializeOwned,
    R: Read + ?Sized,
{
    // Objects are self-delimiting, so the stream is left at the next message
    let mut limited = (&mut *reader).take(max_message_size as u64);
    let next = serde_json::Deserializer::from_reader(&mut limited)
        .into_iter::<T>()
        .next();

    match next {
        Some(Ok(message)) => Ok(message),
        Some(Err(e)) if e.is_eof() && limited.limit() == 0 => Err(NetKvError::FrameTooLarge {
            len: max_message_size + 1,
            max: max_message_size,
        }),
        Some(Err(e)) => Err(json_error(e)),
        None if limited.limit() == 0 => Err(NetKvError::FrameTooLarge {
            len: max_message_size + 1,
            max: max_message_size,
        }),
        None => Err(NetKvError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "end of stream",
        ))),
    }
}

fn write_json<T, W>(writer: &mut W, message: &T) -> Result<()>
where
    T: Serialize,
    W: Write + ?Sized,
{
    serde_json::to_writer(&mut *writer, message).map_err(json_error)?;
    writer.write_all(b"\n")?;
    Ok(())
}

fn json_error(e: serde_json::Error) -> NetKvError {
    if e.is_io() {
        NetKvError::Io(e.into())
    } else if e.is_eof() {
        NetKvError::Decode(format!("truncated message: {}", e))
    } else {
        NetKvError::Decode(e.to_string())
    }
}

// =============================================================================
// Binary
// =============================================================================

fn read_frame<T, R>(reader: &mut R, max_message_size: usize) -> Result<T>
where
    T: DeserializeOwned,
    R: Read + ?Sized,
{
    // EOF on the prefix is a clean disconnect
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    reader.read_exact(&mut prefix)?;

    let len = u32::from_le_bytes(prefix) as usize;
    if len > max_message_size {
        return Err(NetKvError::FrameTooLarge {
            len,
            max: max_message_size,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            NetKvError::Decode(format!("truncated frame: expected {} bytes", len))
        } else {
            NetKvError::Io(e)
        }
    })?;

    bincode::deserialize(&payload).map_err(|e| NetKvError::Decode(e.to_string()))
}

fn write_frame<T, W>(writer: &mut W, message: &T) -> Result<()>
where
    T: Serialize,
    W: Write + ?Sized,
{
    let payload = bincode::serialize(message)
        .map_err(|e| NetKvError::Protocol(format!("encode failed: {}", e)))?;
    let len = u32::try_from(payload.len()).map_err(|_| NetKvError::FrameTooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    writer.write_all(&frame)?;
    Ok(())
}
