//! Configuration for netkv
//!
//! Centralized configuration with sensible defaults.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{NetKvError, Result};
use crate::protocol::Encoding;
use crate::storage::SyncStrategy;

/// Default maximum size of a single message (1 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Default accept deadline used by the stoppable listener
pub const DEFAULT_ACCEPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Main configuration for a netkv server or client
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory of the durable store
    pub db_path: PathBuf,

    /// How often the store log is fsynced
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Transport kind
    pub network: Network,

    /// Socket path for unix, host:port for tcp and http
    pub host: String,

    /// Accept deadline; bounds how long a stop request can go unnoticed
    pub accept_poll_interval: Duration,

    /// Connection read timeout (milliseconds, 0 disables)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 disables)
    pub write_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Protocol Configuration
    // -------------------------------------------------------------------------
    /// Wire encoding for every message on this deployment
    pub encoding: Encoding,

    /// Largest message accepted from a peer, in either encoding
    pub max_message_size: usize,
}

/// Transport a server listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// Unix domain stream socket
    Unix,

    /// TCP stream socket
    Tcp,

    /// HTTP/1.1 over TCP, one message per POST
    Http,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Unix => "unix",
            Network::Tcp => "tcp",
            Network::Http => "http",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = NetKvError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unix" => Ok(Network::Unix),
            "tcp" => Ok(Network::Tcp),
            "http" => Ok(Network::Http),
            other => Err(NetKvError::Config(format!(
                "unsupported network '{}' (expected unix, tcp or http)",
                other
            ))),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./netkv_data"),
            sync_strategy: SyncStrategy::default(),
            network: Network::Unix,
            host: "/tmp/netkv.sock".to_string(),
            accept_poll_interval: DEFAULT_ACCEPT_POLL_INTERVAL,
            read_timeout_ms: 0,
            write_timeout_ms: 0,
            encoding: Encoding::Json,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load a JSON config file (`db`, `host`, `net`, `format`)
    ///
    /// `db` must be present; other missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            NetKvError::Config(format!("cannot open {}: {}", path.display(), e))
        })?;
        let file_config: FileConfig = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| NetKvError::Config(format!("invalid {}: {}", path.display(), e)))?;
        file_config.into_config()
    }
}

/// On-disk JSON configuration
///
/// Keys are accepted in lower case or capitalized (`Db`, `Host`, `Net`,
/// `Format`); anything else is rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    #[serde(alias = "Db", alias = "DB")]
    pub db: Option<String>,
    #[serde(alias = "Host")]
    pub host: Option<String>,
    #[serde(alias = "Net")]
    pub net: Option<String>,
    #[serde(alias = "Format")]
    pub format: Option<String>,
}

impl FileConfig {
    /// Overlay the file values on a default config
    ///
    /// `db` is required; the other fields fall back to their defaults.
    pub fn into_config(self) -> Result<Config> {
        let db = self
            .db
            .filter(|db| !db.is_empty())
            .ok_or_else(|| NetKvError::Config("--db must be a valid path".to_string()))?;

        let mut builder = Config::builder().db_path(db);
        if let Some(host) = self.host {
            builder = builder.host(host);
        }
        if let Some(net) = self.net {
            builder = builder.network(net.parse()?);
        }
        if let Some(format) = self.format {
            builder = builder.encoding(format.parse()?);
        }
        Ok(builder.build())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the durable store directory
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = path.into();
        self
    }

    /// Set the store log sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the transport
    pub fn network(mut self, network: Network) -> Self {
        self.config.network = network;
        self
    }

    /// Set the socket path or host:port
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the wire encoding
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.config.encoding = encoding;
        self
    }

    /// Set the largest accepted message (in bytes)
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Set the accept deadline of the stoppable listener
    pub fn accept_poll_interval(mut self, interval: Duration) -> Self {
        self.config.accept_poll_interval = interval;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
