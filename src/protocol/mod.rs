//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Messages
//! - Request:  `{ id, command, body }`
//! - Response: `{ id, status, body }`
//! - Body:     `{ data, checksum }` where checksum is CRC-32 (IEEE) of data,
//!   or 0 when data is absent
//!
//! ### Commands
//! - 0: GET
//! - 1: PUT    - body carries the value
//! - 2: DELETE
//!
//! ### Status Codes
//! - 0: OK
//! - 1: FAIL   - body carries the error message
//!
//! Two encodings share these messages, see [`codec`].

pub mod checksum;
pub mod codec;
mod message;

pub use checksum::{checksum, stamp, validate};
pub use codec::{Encoding, MessageCodec, LENGTH_PREFIX_SIZE};
pub use message::{Body, Command, Request, Response, Status};
