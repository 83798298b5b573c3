//! Request Dispatcher
//!
//! Owns the listening socket, the storage engine, and the shutdown
//! flag; runs the accept loop.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::Result;
use crate::store::StorageEngine;

use super::connection;

/// The daemon's request dispatcher
pub struct Dispatcher {
    config: Config,
    engine: Mutex<StorageEngine>,
    shutdown: Arc<AtomicBool>,
}

impl Dispatcher {
    /// Create a dispatcher serving the given engine
    pub fn new(config: Config, engine: StorageEngine) -> Self {
        Self {
            config,
            engine: Mutex::new(engine),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for requesting shutdown from another thread or a signal
    /// handler
    ///
    /// The flag is checked between accept cycles, so shutdown takes
    /// effect within one poll interval; an in-flight connection is
    /// finished first.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run the accept loop until shutdown (blocking)
    ///
    /// Binds the socket (replacing a stale socket file), serves
    /// connections strictly in acceptance order, and removes the socket
    /// file on the way out.
    pub fn run(&self) -> Result<()> {
        let socket_path = &self.config.socket_path;

        // A previous daemon instance may have left its socket behind
        match fs::remove_file(socket_path) {
            Ok(()) => tracing::debug!("Removed stale socket at {}", socket_path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let listener = UnixListener::bind(socket_path)?;
        listener.set_nonblocking(true)?;

        tracing::info!("Listening on {}", socket_path.display());

        let poll_interval = Duration::from_millis(self.config.accept_poll_ms);

        while !self.shutdown.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    // Fully synchronous: the next connection is not
                    // accepted until this one is answered and closed
                    if let Err(e) =
                        connection::handle(stream, &self.engine, &self.config)
                    {
                        tracing::warn!("Connection failed: {}", e);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(poll_interval);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Listener-level hiccups are logged, never fatal;
                    // only the shutdown flag ends the loop
                    tracing::error!("Accept failed: {}", e);
                    thread::sleep(poll_interval);
                }
            }
        }

        tracing::info!("Shutdown requested, closing listener");

        drop(listener);
        if let Err(e) = fs::remove_file(socket_path) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!("Failed to remove socket file: {}", e);
            }
        }

        self.engine.lock().sync()?;
        Ok(())
    }
}
