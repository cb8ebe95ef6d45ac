//! netkv Server Binary
//!
//! Serves a store over the configured transport until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use netkv::{Config, LogStore, MemoryStore, NetKvError, NetworkServer, Store};
use tokio::sync::oneshot;
use tracing_subscriber::{fmt, EnvFilter};

/// netkv Server
#[derive(Parser, Debug)]
#[command(name = "netkv-server")]
#[command(about = "Network key-value server")]
#[command(version)]
struct Args {
    /// Path to the database directory
    #[arg(long)]
    db: Option<PathBuf>,

    /// Network type (unix, tcp, http)
    #[arg(long, default_value = "unix")]
    net: String,

    /// Socket path for unix, host:port for tcp and http
    #[arg(long, default_value = "/tmp/netkv.sock")]
    host: String,

    /// Wire format (json, binary)
    #[arg(long, default_value = "json")]
    form: String,

    /// Keep data in memory only (no --db needed)
    #[arg(long)]
    memory: bool,

    /// JSON config file with db, host, net and format (skips other flags)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn to_config(&self) -> netkv::Result<Config> {
        if let Some(path) = &self.config {
            return Config::from_file(path);
        }

        let mut builder = Config::builder()
            .network(self.net.parse()?)
            .host(&self.host)
            .encoding(self.form.parse()?);
        if let Some(db) = &self.db {
            builder = builder.db_path(db);
        } else if !self.memory {
            return Err(NetKvError::Config(
                "--db must be a valid path (or pass --memory)".to_string(),
            ));
        }
        Ok(builder.build())
    }
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,netkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let config = match args.to_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(2);
        }
    };

    tracing::info!("netkv server v{}", netkv::VERSION);
    tracing::info!("Network: {} {}", config.network, config.host);
    tracing::info!("Format: {}", config.encoding);

    // Open store
    let store: Arc<dyn Store> = if args.memory {
        tracing::info!("Using in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        tracing::info!("Data directory: {}", config.db_path.display());
        match LogStore::open(&config.db_path, config.sync_strategy) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::error!("Failed to open store: {}", e);
                std::process::exit(1);
            }
        }
    };

    let server = Arc::new(NetworkServer::new(config));
    let (done_tx, done_rx) = oneshot::channel();

    let serving = {
        let server = Arc::clone(&server);
        let store = Arc::clone(&store);
        thread::Builder::new()
            .name("netkv-accept".to_string())
            .spawn(move || {
                let result = server.listen_and_serve(store);
                let _ = done_tx.send(());
                result
            })
    };
    let serving = match serving {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("Failed to start server thread: {}", e);
            std::process::exit(1);
        }
    };

    // Wait for a signal, or for the server to end on its own
    match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime.block_on(async {
            tokio::select! {
                _ = shutdown_signal() => tracing::info!("Received shutdown signal, stopping..."),
                _ = done_rx => {}
            }
        }),
        Err(e) => tracing::error!("Failed to start signal runtime: {}", e),
    }

    server.stop();
    let mut exit_code = 0;
    match serving.join() {
        Ok(Ok(())) | Ok(Err(NetKvError::Stopped)) => {}
        Ok(Err(e)) => {
            tracing::error!("Server error: {}", e);
            exit_code = 1;
        }
        Err(_) => {
            tracing::error!("Server thread panicked");
            exit_code = 1;
        }
    }

    if let Err(e) = store.close() {
        tracing::error!("Failed to close store: {}", e);
        exit_code = 1;
    }

    tracing::info!("Server stopped");
    std::process::exit(exit_code);
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
