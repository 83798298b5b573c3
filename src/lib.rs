//! # blockkv
//!
//! A minimal local key-value store:
//! - Single fixed-size backing file (64 MiB, block-allocated)
//! - Free-space bitmap + fixed-capacity key directory in block 0
//! - Values stored as singly linked chains of 4 KiB data blocks
//! - Unix-socket daemon speaking a length-framed binary protocol
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Unix Socket Clients                      │
//! │              (one framed request per connection)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Dispatcher                              │
//! │        (accept loop, decode, serialize engine access)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!               ┌───────▼────────┐
//!               │ StorageEngine  │
//!               │  (Mutex<..>)   │
//!               └───────┬────────┘
//!                       │
//!               ┌───────▼────────┐
//!               │   BlockFile    │
//!               │  (64 MiB file) │
//!               └────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod store;
pub mod protocol;
pub mod server;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::Config;
pub use store::StorageEngine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of blockkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
