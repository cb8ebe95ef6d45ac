//! netkv CLI Client
//!
//! Command-line interface for interacting with a netkv server.

use clap::{Parser, Subcommand};
use netkv::{Client, Encoding, MessageCodec, Network};

/// netkv CLI
#[derive(Parser, Debug)]
#[command(name = "netkv-cli")]
#[command(about = "CLI for the netkv key-value server")]
struct Args {
    /// Network type (unix, tcp, http)
    #[arg(long, default_value = "unix")]
    net: String,

    /// Socket path for unix, host:port for tcp and http
    #[arg(long, default_value = "/tmp/netkv.sock")]
    host: String,

    /// Wire format (json, binary)
    #[arg(long, default_value = "json")]
    form: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },
}

fn run(args: Args) -> netkv::Result<()> {
    let network: Network = args.net.parse()?;
    let encoding: Encoding = args.form.parse()?;
    let codec = MessageCodec::new(encoding, netkv::config::DEFAULT_MAX_MESSAGE_SIZE);
    let mut client = Client::connect(network, &args.host, codec)?;

    match args.command {
        Commands::Get { key } => {
            let value = client.get(key.as_bytes())?;
            println!("{}", String::from_utf8_lossy(&value));
        }
        Commands::Put { key, value } => {
            client.put(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Del { key } => {
            client.delete(key.as_bytes())?;
            println!("OK");
        }
    }
    Ok(())
}

fn main() {
    if let Err(e) = run(Args::parse()) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
