//! Metadata Block
//!
//! Block 0 of the store: magic/version sentinel, free-block bitmap, and
//! the fixed-capacity key directory. The whole block is read and written
//! as a single unit once per engine operation - there is no incremental
//! metadata update, so a failed operation never persists partial state.

use crate::error::{Result, StoreError};

use super::{BLOCK_SIZE, FORMAT_VERSION, MAGIC, MAX_KEYS, MAX_KEY_SIZE, TOTAL_BLOCKS};

/// Bitmap size in bytes: one bit per block
const BITMAP_SIZE: usize = TOTAL_BLOCKS / 8;

/// Encoded size of one key entry: key (256) + first_block (4) + size (4) + valid (1)
const ENTRY_SIZE: usize = MAX_KEY_SIZE + 9;

/// Byte offset of the bitmap within the metadata block
const BITMAP_OFFSET: usize = 16;

/// Byte offset of the key directory within the metadata block
const ENTRIES_OFFSET: usize = BITMAP_OFFSET + BITMAP_SIZE;

/// One slot of the key directory
///
/// A valid entry is the sole owner of the block chain rooted at
/// `first_block_id` (0 when the value is empty).
#[derive(Debug, Clone, Default)]
pub struct KeyEntry {
    pub key: String,
    pub first_block_id: u32,
    pub value_size: u32,
    pub valid: bool,
}

/// In-memory form of block 0
#[derive(Debug, Clone)]
pub struct Metadata {
    pub total_blocks: u32,
    pub free_blocks: u32,
    bitmap: [u8; BITMAP_SIZE],
    pub entries: [KeyEntry; MAX_KEYS],
}

impl Metadata {
    /// A freshly initialized metadata block: block 0 used, everything
    /// else free, no key entries
    pub fn new() -> Self {
        let mut bitmap = [0u8; BITMAP_SIZE];
        bitmap[0] = 0x01;

        Self {
            total_blocks: TOTAL_BLOCKS as u32,
            free_blocks: (TOTAL_BLOCKS - 1) as u32,
            bitmap,
            entries: Default::default(),
        }
    }

    // =========================================================================
    // Encoding / Decoding
    // =========================================================================

    /// Encode to a full metadata block (zero padding included)
    pub fn encode(&self) -> [u8; BLOCK_SIZE] {
        let mut block = [0u8; BLOCK_SIZE];

        block[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        block[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        block[8..12].copy_from_slice(&self.total_blocks.to_le_bytes());
        block[12..16].copy_from_slice(&self.free_blocks.to_le_bytes());
        block[BITMAP_OFFSET..ENTRIES_OFFSET].copy_from_slice(&self.bitmap);

        for (i, entry) in self.entries.iter().enumerate() {
            let base = ENTRIES_OFFSET + i * ENTRY_SIZE;
            let key_bytes = entry.key.as_bytes();
            block[base..base + key_bytes.len()].copy_from_slice(key_bytes);
            block[base + MAX_KEY_SIZE..base + MAX_KEY_SIZE + 4]
                .copy_from_slice(&entry.first_block_id.to_le_bytes());
            block[base + MAX_KEY_SIZE + 4..base + MAX_KEY_SIZE + 8]
                .copy_from_slice(&entry.value_size.to_le_bytes());
            block[base + MAX_KEY_SIZE + 8] = entry.valid as u8;
        }

        block
    }

    /// Decode from a full metadata block, validating magic and version
    pub fn decode(block: &[u8; BLOCK_SIZE]) -> Result<Self> {
        let magic = u32::from_le_bytes(block[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(StoreError::CorruptStore(format!(
                "bad magic: expected {:#010x}, got {:#010x}",
                MAGIC, magic
            )));
        }

        let version = u32::from_le_bytes(block[4..8].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(StoreError::CorruptStore(format!(
                "unsupported format version: {}",
                version
            )));
        }

        let total_blocks = u32::from_le_bytes(block[8..12].try_into().unwrap());
        let free_blocks = u32::from_le_bytes(block[12..16].try_into().unwrap());

        let mut bitmap = [0u8; BITMAP_SIZE];
        bitmap.copy_from_slice(&block[BITMAP_OFFSET..ENTRIES_OFFSET]);

        let mut entries: [KeyEntry; MAX_KEYS] = Default::default();
        for (i, entry) in entries.iter_mut().enumerate() {
            let base = ENTRIES_OFFSET + i * ENTRY_SIZE;

            let key_field = &block[base..base + MAX_KEY_SIZE];
            let key_len = key_field.iter().position(|&b| b == 0).unwrap_or(MAX_KEY_SIZE);
            let key = std::str::from_utf8(&key_field[..key_len])
                .map_err(|_| {
                    StoreError::CorruptStore(format!("key entry {} is not valid UTF-8", i))
                })?
                .to_string();

            entry.key = key;
            entry.first_block_id =
                u32::from_le_bytes(block[base + MAX_KEY_SIZE..base + MAX_KEY_SIZE + 4].try_into().unwrap());
            entry.value_size = u32::from_le_bytes(
                block[base + MAX_KEY_SIZE + 4..base + MAX_KEY_SIZE + 8].try_into().unwrap(),
            );
            entry.valid = block[base + MAX_KEY_SIZE + 8] != 0;
        }

        Ok(Self {
            total_blocks,
            free_blocks,
            bitmap,
            entries,
        })
    }

    // =========================================================================
    // Free-Block Bitmap
    // =========================================================================

    /// Whether block `id` is marked in use
    pub fn is_used(&self, id: u32) -> bool {
        let id = id as usize;
        self.bitmap[id / 8] & (1 << (id % 8)) != 0
    }

    /// Find the lowest-numbered free block, scanning ascending from block 1
    ///
    /// First-fit-ascending order is part of the store's observable
    /// contract, not an implementation detail.
    pub fn find_free_block(&self) -> Result<u32> {
        for id in 1..TOTAL_BLOCKS {
            if self.bitmap[id / 8] & (1 << (id % 8)) == 0 {
                return Ok(id as u32);
            }
        }
        Err(StoreError::OutOfSpace)
    }

    /// Mark a block in use; the caller must not double-mark
    pub fn mark_used(&mut self, id: u32) {
        debug_assert!(!self.is_used(id), "double mark_used of block {}", id);
        let id = id as usize;
        self.bitmap[id / 8] |= 1 << (id % 8);
        self.free_blocks -= 1;
    }

    /// Mark a block free; the caller must not double-free
    pub fn mark_free(&mut self, id: u32) {
        debug_assert!(self.is_used(id), "double mark_free of block {}", id);
        let id = id as usize;
        self.bitmap[id / 8] &= !(1 << (id % 8));
        self.free_blocks += 1;
    }

    // =========================================================================
    // Key Directory
    // =========================================================================

    /// Index of the first valid entry whose key matches exactly
    pub fn find_entry(&self, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.valid && e.key == key)
    }

    /// Slot index for storing `key`: an existing valid match (overwrite)
    /// or the first invalid slot
    pub fn allocate_entry_slot(&self, key: &str) -> Result<usize> {
        let mut empty_slot = None;
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.valid {
                if entry.key == key {
                    return Ok(i);
                }
            } else if empty_slot.is_none() {
                empty_slot = Some(i);
            }
        }
        empty_slot.ok_or(StoreError::DirectoryFull)
    }

    /// Number of valid key entries
    pub fn key_count(&self) -> usize {
        self.entries.iter().filter(|e| e.valid).count()
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new()
    }
}
