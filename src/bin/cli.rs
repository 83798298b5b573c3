//! blockkv CLI Client
//!
//! Command-line interface for a running blockkv daemon.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use blockkv::client::Client;
use blockkv::Result;

/// blockkv CLI
#[derive(Parser, Debug)]
#[command(name = "blockkv-cli")]
#[command(about = "CLI for the blockkv key-value daemon")]
#[command(version)]
struct Args {
    /// Daemon socket path
    #[arg(short, long, default_value = "/tmp/blockkv.sock")]
    socket: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a value under a key
    Put {
        /// The key to store under
        key: String,

        /// The value to store
        value: String,
    },

    /// Fetch a value by key
    Get {
        /// The key to fetch
        key: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },
}

fn main() {
    let args = Args::parse();
    let mut client = Client::new(&args.socket);

    if let Err(e) = run(&mut client, args.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(client: &mut Client, command: Commands) -> Result<()> {
    match command {
        Commands::Put { key, value } => {
            client.put(&key, value.as_bytes())?;
            println!("OK");
        }
        Commands::Get { key } => {
            let value = client.get(&key)?;
            // Values are raw bytes; write them as-is
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&value)?;
            stdout.write_all(b"\n")?;
        }
        Commands::Del { key } => {
            client.delete(&key)?;
            println!("OK");
        }
    }
    Ok(())
}
