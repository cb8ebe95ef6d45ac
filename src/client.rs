//! Client Module
//!
//! Blocking client speaking the same protocol as the server.
//!
//! Stream transports keep one connection open for every call; http opens
//! one connection per call and sends a single `POST /` through hyper.

use std::io::{BufReader, BufWriter, Cursor, Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::StatusCode;
use hyper_util::rt::TokioIo;
use tokio::runtime::{self, Runtime};

use crate::config::{Config, Network};
use crate::error::{NetKvError, Result};
use crate::protocol::{MessageCodec, Request, Response};

/// Open stream connection
struct StreamConn {
    reader: BufReader<Box<dyn Read + Send>>,
    writer: BufWriter<Box<dyn Write + Send>>,
}

/// netkv client
pub struct Client {
    network: Network,
    host: String,
    codec: MessageCodec,
    conn: Option<StreamConn>,
    /// Drives the hyper client for http
    runtime: Option<Runtime>,
}

impl Client {
    /// Connect to a server
    ///
    /// For http nothing is dialed until the first request.
    pub fn connect(network: Network, host: &str, codec: MessageCodec) -> Result<Self> {
        let runtime = match network {
            Network::Http => Some(runtime::Builder::new_current_thread().enable_all().build()?),
            _ => None,
        };
        let conn = match network {
            Network::Tcp => {
                let stream = TcpStream::connect(host)?;
                stream.set_nodelay(true)?;
                let read_half = stream.try_clone()?;
                Some(StreamConn {
                    reader: BufReader::new(Box::new(read_half)),
                    writer: BufWriter::new(Box::new(stream)),
                })
            }
            Network::Unix => Some(Self::connect_unix(host)?),
            Network::Http => None,
        };

        Ok(Self {
            network,
            host: host.to_string(),
            codec,
            conn,
            runtime,
        })
    }

    /// Connect using the network, host and encoding of `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::connect(config.network, &config.host, MessageCodec::from_config(config))
    }

    #[cfg(unix)]
    fn connect_unix(path: &str) -> Result<StreamConn> {
        let stream = UnixStream::connect(path)?;
        let read_half = stream.try_clone()?;
        Ok(StreamConn {
            reader: BufReader::new(Box::new(read_half)),
            writer: BufWriter::new(Box::new(stream)),
        })
    }

    #[cfg(not(unix))]
    fn connect_unix(_path: &str) -> Result<StreamConn> {
        Err(NetKvError::Config(
            "unix sockets are not supported on this platform".to_string(),
        ))
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Get a value by key
    pub fn get(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        let response = self.expect_ok(Request::get(key))?;
        Ok(response.data().map(<[u8]>::to_vec).unwrap_or_default())
    }

    /// Set a key-value pair
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.expect_ok(Request::put(key, value)).map(|_| ())
    }

    /// Delete a key
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.expect_ok(Request::delete(key)).map(|_| ())
    }

    /// Send any request and return the raw response
    ///
    /// The request body is stamped and the response body validated.
    pub fn request(&mut self, request: Request) -> Result<Response> {
        if let Some(conn) = self.conn.as_mut() {
            self.codec.write_request(&mut conn.writer, request)?;
            return self.codec.read_response(&mut conn.reader);
        }

        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| NetKvError::Protocol("client has no open connection".to_string()))?;
        let mut payload = Vec::new();
        self.codec.write_request(&mut payload, request)?;
        let body = runtime.block_on(post(&self.host, payload))?;
        self.codec.read_response(&mut Cursor::new(body))
    }

    fn expect_ok(&mut self, request: Request) -> Result<Response> {
        let response = self.request(request)?;
        if !response.is_ok() {
            return Err(NetKvError::Remote(response.message()));
        }
        Ok(response)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

/// One HTTP/1.1 POST to `/` on a fresh connection, returning the body
async fn post(host: &str, payload: Vec<u8>) -> Result<Bytes> {
    let stream = tokio::net::TcpStream::connect(host).await?;
    stream.set_nodelay(true)?;

    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(http_error)?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!("HTTP client connection error: {}", e);
        }
    });

    let request = hyper::Request::post("/")
        .header(HOST, host)
        .header(CONTENT_TYPE, "application/octet-stream")
        .body(Full::new(Bytes::from(payload)))
        .map_err(|e| NetKvError::Protocol(format!("invalid HTTP request: {}", e)))?;

    let response = sender.send_request(request).await.map_err(http_error)?;
    if response.status() != StatusCode::OK {
        return Err(NetKvError::Protocol(format!(
            "HTTP status {}",
            response.status().as_u16()
        )));
    }

    let body = response.into_body().collect().await.map_err(http_error)?;
    Ok(body.to_bytes())
}

fn http_error(e: hyper::Error) -> NetKvError {
    NetKvError::Protocol(format!("HTTP error: {}", e))
}
