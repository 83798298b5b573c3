//! blockkv Daemon Binary
//!
//! Opens (or creates) the store file, binds the unix socket, and runs
//! the dispatcher until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use blockkv::server::Dispatcher;
use blockkv::{Config, StorageEngine};

/// blockkv daemon
#[derive(Parser, Debug)]
#[command(name = "blockkv-daemon")]
#[command(about = "Block-allocated key-value store daemon")]
#[command(version)]
struct Args {
    /// Path to the storage file (created if it doesn't exist)
    storage_file: PathBuf,

    /// Unix socket path to listen on
    #[arg(short, long, default_value = "/tmp/blockkv.sock")]
    socket: PathBuf,

    /// Accept-loop poll interval in milliseconds
    #[arg(long, default_value = "100")]
    poll_ms: u64,

    /// Connection read timeout in milliseconds (0 disables)
    #[arg(long, default_value = "5000")]
    read_timeout_ms: u64,

    /// Connection write timeout in milliseconds (0 disables)
    #[arg(long, default_value = "5000")]
    write_timeout_ms: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,blockkv=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    tracing::info!("blockkv daemon v{}", blockkv::VERSION);
    tracing::info!("Storage file: {}", args.storage_file.display());
    tracing::info!("Socket: {}", args.socket.display());

    let config = Config::builder()
        .storage_path(&args.storage_file)
        .socket_path(&args.socket)
        .accept_poll_ms(args.poll_ms)
        .read_timeout_ms(args.read_timeout_ms)
        .write_timeout_ms(args.write_timeout_ms)
        .build();

    let engine = match StorageEngine::open(&config.storage_path) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Store opened successfully");

    let dispatcher = Dispatcher::new(config, engine);

    // SIGINT/SIGTERM flip the shutdown flag; the accept loop observes
    // it within one poll interval
    let shutdown = dispatcher.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Received shutdown signal");
        shutdown.store(true, Ordering::Relaxed);
    }) {
        tracing::error!("Failed to install signal handler: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = dispatcher.run() {
        tracing::error!("Dispatcher error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Daemon stopped");
}
