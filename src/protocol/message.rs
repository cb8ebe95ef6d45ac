//! Message definitions
//!
//! Requests, responses and the checksummed body they carry.

use serde::{Deserialize, Serialize};

/// Storage operation requested by a client
///
/// Encoded on the wire as a number (0 = GET, 1 = PUT, 2 = DELETE). Other
/// numbers decode to `Unsupported` so the server can answer them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum Command {
    Get,
    Put,
    Delete,
    Unsupported(u32),
}

impl From<u32> for Command {
    fn from(code: u32) -> Self {
        match code {
            0 => Command::Get,
            1 => Command::Put,
            2 => Command::Delete,
            other => Command::Unsupported(other),
        }
    }
}

impl From<Command> for u32 {
    fn from(command: Command) -> Self {
        match command {
            Command::Get => 0,
            Command::Put => 1,
            Command::Delete => 2,
            Command::Unsupported(code) => code,
        }
    }
}

/// Outcome of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Status {
    Ok,
    Fail,
}

impl TryFrom<u32> for Status {
    type Error = String;

    fn try_from(code: u32) -> std::result::Result<Self, Self::Error> {
        match code {
            0 => Ok(Status::Ok),
            1 => Ok(Status::Fail),
            other => Err(format!("unknown response status {}", other)),
        }
    }
}

impl From<Status> for u32 {
    fn from(status: Status) -> Self {
        match status {
            Status::Ok => 0,
            Status::Fail => 1,
        }
    }
}

/// Payload plus integrity checksum
///
/// `data == None` requires `checksum == 0`; otherwise `checksum` is the
/// CRC-32 of `data`. See [`crate::protocol::checksum`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    #[serde(default, with = "base64_bytes::option")]
    pub data: Option<Vec<u8>>,

    #[serde(default)]
    pub checksum: u32,
}

impl Body {
    /// Body carrying `data`, checksum already stamped
    pub fn with_data(data: impl Into<Vec<u8>>) -> Self {
        let mut body = Self {
            data: Some(data.into()),
            checksum: 0,
        };
        body.stamp();
        body
    }
}

/// A client request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// The key; must be non-empty
    #[serde(default, with = "base64_bytes")]
    pub id: Vec<u8>,

    /// Missing command is answered with FAIL
    #[serde(default)]
    pub command: Option<Command>,

    #[serde(default)]
    pub body: Option<Body>,
}

impl Request {
    pub fn new(command: Command, id: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            command: Some(command),
            body: None,
        }
    }

    pub fn get(key: impl Into<Vec<u8>>) -> Self {
        Self::new(Command::Get, key)
    }

    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            body: Some(Body::with_data(value)),
            ..Self::new(Command::Put, key)
        }
    }

    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self::new(Command::Delete, key)
    }
}

/// A server response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Echo of the request id, empty on protocol-level failure
    #[serde(default, with = "base64_bytes")]
    pub id: Vec<u8>,

    pub status: Status,

    #[serde(default)]
    pub body: Option<Body>,
}

impl Response {
    /// OK response, with `data` as body when present
    pub fn ok(data: Option<Vec<u8>>) -> Self {
        Self {
            id: Vec::new(),
            status: Status::Ok,
            body: data.map(Body::with_data),
        }
    }

    /// FAIL response carrying a human readable message
    pub fn fail(message: &str) -> Self {
        Self {
            id: Vec::new(),
            status: Status::Fail,
            body: Some(Body::with_data(message.as_bytes())),
        }
    }

    /// Set the echoed id
    pub fn with_id(mut self, id: &[u8]) -> Self {
        self.id = id.to_vec();
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Body data, if any
    pub fn data(&self) -> Option<&[u8]> {
        self.body.as_ref().and_then(|b| b.data.as_deref())
    }

    /// Body data as text, for FAIL messages
    pub fn message(&self) -> String {
        self.data()
            .map(|d| String::from_utf8_lossy(d).into_owned())
            .unwrap_or_default()
    }
}

/// Byte fields as base64 strings in human readable encodings
///
/// Compact encodings keep the plain byte sequence. A JSON `null` reads as
/// empty (or absent) bytes.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&STANDARD.encode(bytes))
        } else {
            bytes.serialize(serializer)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        if deserializer.is_human_readable() {
            let text = Option::<String>::deserialize(deserializer)?;
            decode::<D>(text.as_deref().unwrap_or_default())
        } else {
            Vec::deserialize(deserializer)
        }
    }

    fn decode<'de, D: Deserializer<'de>>(text: &str) -> Result<Vec<u8>, D::Error> {
        STANDARD
            .decode(text)
            .map_err(|e| D::Error::custom(format!("invalid base64: {}", e)))
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            if serializer.is_human_readable() {
                match bytes {
                    Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
                    None => serializer.serialize_none(),
                }
            } else {
                bytes.serialize(serializer)
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            if deserializer.is_human_readable() {
                Option::<String>::deserialize(deserializer)?
                    .map(|text| decode::<D>(&text))
                    .transpose()
            } else {
                Option::deserialize(deserializer)
            }
        }
    }
}
