//! Storage Engine
//!
//! put/get/delete over keys and byte values, built on the block file and
//! the metadata directory. Values live in singly linked chains of data
//! blocks allocated first-fit ascending from the bitmap.
//!
//! Per-key state machine: Absent → Present (put), Present → Present
//! (put overwrite), Present → Absent (delete). No other transitions.
//!
//! Each operation reads block 0 once, works on that in-memory copy, and
//! persists it once at the end. A failure mid-operation drops the copy,
//! leaving block 0 in its pre-operation state - no partial allocation is
//! ever charged.

use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

use super::{BlockFile, Metadata, BLOCK_PAYLOAD, BLOCK_SIZE, MAX_KEY_SIZE, TOTAL_BLOCKS};

// =============================================================================
// Data Block Codec
// =============================================================================
//
// Data block layout: NextBlock: u32 | DataSize: u32 | Payload: [4088]u8

/// Encode one chain node as a full block (payload tail zero-filled)
fn encode_data_block(next_block_id: u32, data: &[u8]) -> [u8; BLOCK_SIZE] {
    debug_assert!(data.len() <= BLOCK_PAYLOAD);

    let mut block = [0u8; BLOCK_SIZE];
    block[0..4].copy_from_slice(&next_block_id.to_le_bytes());
    block[4..8].copy_from_slice(&(data.len() as u32).to_le_bytes());
    block[8..8 + data.len()].copy_from_slice(data);
    block
}

/// Decode one chain node: (next_block_id, used payload)
fn decode_data_block(block: &[u8; BLOCK_SIZE]) -> Result<(u32, &[u8])> {
    let next_block_id = u32::from_le_bytes(block[0..4].try_into().unwrap());
    let data_size = u32::from_le_bytes(block[4..8].try_into().unwrap()) as usize;

    if data_size > BLOCK_PAYLOAD {
        return Err(StoreError::CorruptStore(format!(
            "data block claims {} payload bytes (max {})",
            data_size, BLOCK_PAYLOAD
        )));
    }

    Ok((next_block_id, &block[8..8 + data_size]))
}

/// Overwrite a chain node's next pointer in place
fn patch_next_block_id(block: &mut [u8; BLOCK_SIZE], next_block_id: u32) {
    block[0..4].copy_from_slice(&next_block_id.to_le_bytes());
}

// =============================================================================
// Storage Engine
// =============================================================================

/// The block-chained storage engine
///
/// Not internally synchronized: the dispatcher wraps the engine in a
/// mutex and holds it for the whole of each operation.
pub struct StorageEngine {
    file: BlockFile,
    path: PathBuf,
}

impl StorageEngine {
    /// Open an existing store file or create a fresh one
    pub fn open(path: &Path) -> Result<Self> {
        let file = BlockFile::open_or_create(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Store a value under a key, overwriting any previous value
    ///
    /// The previous chain (if any) is released before the new chain is
    /// allocated, so an overwrite can reuse its own blocks.
    pub fn put(&mut self, key: &str, value: &[u8]) -> Result<()> {
        if key.len() >= MAX_KEY_SIZE {
            return Err(StoreError::KeyTooLong);
        }

        let mut meta = self.read_metadata()?;
        let slot = meta.allocate_entry_slot(key)?;

        if meta.entries[slot].valid {
            let old_first = meta.entries[slot].first_block_id;
            self.free_chain(&mut meta, old_first)?;
        }

        let blocks_needed = value.len().div_ceil(BLOCK_PAYLOAD);
        if blocks_needed > meta.free_blocks as usize {
            return Err(StoreError::OutOfSpace);
        }

        // Allocate and write the chain front to back, linking each new
        // block into its predecessor by a read-modify-write of the
        // predecessor's next pointer.
        let mut first_block_id = 0u32;
        let mut prev_block_id = 0u32;
        let mut written = 0usize;

        while written < value.len() {
            let block_id = meta.find_free_block()?;
            meta.mark_used(block_id);

            let take = (value.len() - written).min(BLOCK_PAYLOAD);
            self.file
                .write_block(block_id, &encode_data_block(0, &value[written..written + take]))?;

            if prev_block_id == 0 {
                first_block_id = block_id;
            } else {
                let mut prev = self.file.read_block(prev_block_id)?;
                patch_next_block_id(&mut prev, block_id);
                self.file.write_block(prev_block_id, &prev)?;
            }

            written += take;
            prev_block_id = block_id;
        }

        let entry = &mut meta.entries[slot];
        entry.key = key.to_string();
        entry.first_block_id = first_block_id;
        entry.value_size = value.len() as u32;
        entry.valid = true;

        self.write_metadata(&meta)?;

        tracing::debug!(
            key,
            value_size = value.len(),
            blocks = blocks_needed,
            "put"
        );
        Ok(())
    }

    /// The stored size of a key's value, without reading the chain
    /// (the size-probe mode of get)
    pub fn value_size(&mut self, key: &str) -> Result<usize> {
        let meta = self.read_metadata()?;
        let idx = meta.find_entry(key).ok_or(StoreError::NotFound)?;
        Ok(meta.entries[idx].value_size as usize)
    }

    /// Read a value into a freshly allocated buffer
    pub fn get(&mut self, key: &str) -> Result<Vec<u8>> {
        let size = self.value_size(key)?;
        let mut value = vec![0u8; size];
        let copied = self.get_into(key, &mut value)?;
        value.truncate(copied);
        Ok(value)
    }

    /// Read a value into a caller-supplied buffer, returning the copied
    /// length
    ///
    /// Fails with `BufferTooSmall` (reporting the required size) if the
    /// buffer cannot hold the whole value.
    pub fn get_into(&mut self, key: &str, buf: &mut [u8]) -> Result<usize> {
        let meta = self.read_metadata()?;
        let idx = meta.find_entry(key).ok_or(StoreError::NotFound)?;

        let value_size = meta.entries[idx].value_size as usize;
        if buf.len() < value_size {
            return Err(StoreError::BufferTooSmall {
                required: value_size,
            });
        }

        let mut block_id = meta.entries[idx].first_block_id;
        let mut copied = 0usize;

        while block_id != 0 && copied < value_size {
            let block = self.file.read_block(block_id)?;
            let (next_block_id, data) = decode_data_block(&block)?;

            let take = (value_size - copied).min(data.len());
            buf[copied..copied + take].copy_from_slice(&data[..take]);

            copied += take;
            block_id = next_block_id;
        }

        Ok(copied)
    }

    /// Remove a key, releasing its whole chain
    pub fn delete(&mut self, key: &str) -> Result<()> {
        let mut meta = self.read_metadata()?;
        let idx = meta.find_entry(key).ok_or(StoreError::NotFound)?;

        let first_block_id = meta.entries[idx].first_block_id;
        self.free_chain(&mut meta, first_block_id)?;

        let entry = &mut meta.entries[idx];
        entry.key.clear();
        entry.first_block_id = 0;
        entry.value_size = 0;
        entry.valid = false;

        self.write_metadata(&meta)?;

        tracing::debug!(key, "delete");
        Ok(())
    }

    /// Flush all written blocks to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync()
    }

    // =========================================================================
    // Accessors (for testing and logging)
    // =========================================================================

    /// Current free block count from metadata
    pub fn free_blocks(&mut self) -> Result<u32> {
        Ok(self.read_metadata()?.free_blocks)
    }

    /// Number of keys currently present
    pub fn key_count(&mut self) -> Result<usize> {
        Ok(self.read_metadata()?.key_count())
    }

    /// Path of the backing store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn read_metadata(&mut self) -> Result<Metadata> {
        Metadata::decode(&self.file.read_block(0)?)
    }

    fn write_metadata(&mut self, meta: &Metadata) -> Result<()> {
        self.file.write_block(0, &meta.encode())
    }

    /// Walk a chain marking every block free in the metadata copy
    ///
    /// Iteration is bounded by the block count so a pointer cycle in a
    /// corrupt chain fails instead of spinning.
    fn free_chain(&mut self, meta: &mut Metadata, first_block_id: u32) -> Result<()> {
        let mut block_id = first_block_id;
        let mut freed = 0usize;

        while block_id != 0 {
            if freed >= TOTAL_BLOCKS {
                return Err(StoreError::CorruptStore(
                    "cycle detected while freeing chain".to_string(),
                ));
            }

            let block = self.file.read_block(block_id)?;
            let (next_block_id, _) = decode_data_block(&block)?;

            meta.mark_free(block_id);
            freed += 1;
            block_id = next_block_id;
        }

        Ok(())
    }
}
