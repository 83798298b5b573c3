//! Store Module
//!
//! Block-allocated persistent storage over a single fixed-size file.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Block 0 - Metadata (4096 bytes)                             │
//! │   Magic: u32 | Version: u32 | TotalBlocks: u32              │
//! │   FreeBlocks: u32 | Bitmap: [2048]u8 (1 bit per block)      │
//! │   KeyEntry × 7:                                             │
//! │     Key: [256]u8 NUL-padded | FirstBlock: u32               │
//! │     ValueSize: u32 | Valid: u8                              │
//! │   Padding: [177]u8                                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Blocks 1..16383 - Data (4096 bytes each)                    │
//! │   NextBlock: u32 (0 = chain end) | DataSize: u32            │
//! │   Payload: [4088]u8 (unused tail zero-filled)               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian, encoded field by field.
//!
//! A value is a singly linked, forward-only chain of data blocks; the
//! chain's total byte length equals the owning key entry's `value_size`.
//! Bitmap bit *i* is set iff block *i* is block 0 or reachable from a
//! valid key entry's chain.

mod block_file;
mod metadata;
mod engine;

pub use block_file::BlockFile;
pub use metadata::{KeyEntry, Metadata};
pub use engine::StorageEngine;

// =============================================================================
// Shared Constants (used by block file, metadata, engine)
// =============================================================================

/// Size of every block in bytes
pub const BLOCK_SIZE: usize = 4096;

/// Total number of blocks in the backing file (64 MiB / 4 KiB)
pub const TOTAL_BLOCKS: usize = 16384;

/// Maximum key length in bytes; keys must be strictly shorter
pub const MAX_KEY_SIZE: usize = 256;

/// Capacity of the key directory in block 0
pub const MAX_KEYS: usize = 7;

/// Data bytes per block after the 8-byte chain-node header
pub const BLOCK_PAYLOAD: usize = BLOCK_SIZE - 8;

/// Magic constant identifying a valid store file
pub const MAGIC: u32 = 0xDEAD_BEEF;

/// Current on-disk format version
pub const FORMAT_VERSION: u32 = 1;
