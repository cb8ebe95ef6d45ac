//! Body checksums
//!
//! CRC-32 (IEEE) over body data, stamped before every send and checked
//! after every receive.

use super::Body;

/// CRC-32 (IEEE) of `data`
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Check a possibly absent body
///
/// An absent body is valid, so is a body without data and a zero checksum.
pub fn validate(body: Option<&Body>) -> bool {
    body.map_or(true, Body::validate)
}

/// Stamp a possibly absent body
pub fn stamp(body: Option<&mut Body>) {
    if let Some(body) = body {
        body.stamp();
    }
}

impl Body {
    /// True if the checksum matches the data
    pub fn validate(&self) -> bool {
        match &self.data {
            None => self.checksum == 0,
            Some(data) => self.checksum == checksum(data),
        }
    }

    /// Recompute the checksum from the data
    pub fn stamp(&mut self) {
        self.checksum = self.data.as_deref().map_or(0, checksum);
    }
}
