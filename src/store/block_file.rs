//! Block File
//!
//! Raw block-granularity I/O over the fixed-size backing file. Every
//! transfer moves exactly one full block, so unused tail bytes on disk
//! are always zero-filled and on-disk content stays deterministic.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Result, StoreError};

use super::{Metadata, BLOCK_SIZE, TOTAL_BLOCKS};

/// The fixed-size backing file, addressed by block id
pub struct BlockFile {
    file: File,
}

impl BlockFile {
    /// Open an existing store file or create a fresh one
    ///
    /// On create: the file is extended to its full `TOTAL_BLOCKS *
    /// BLOCK_SIZE` size and an initialized metadata block is written
    /// (block 0 used, all other blocks free, zero key entries).
    ///
    /// On open: block 0 is read and its magic/version validated;
    /// a mismatch fails with `CorruptStore`.
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let file = OpenOptions::new().read(true).write(true).open(path)?;
            let mut block_file = Self { file };

            // Validate block 0 before handing the file out
            let block = block_file.read_block(0)?;
            Metadata::decode(&block)?;

            tracing::debug!("Opened existing store at {}", path.display());
            Ok(block_file)
        } else {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .open(path)?;
            file.set_len((TOTAL_BLOCKS * BLOCK_SIZE) as u64)?;

            let mut block_file = Self { file };
            block_file.write_block(0, &Metadata::new().encode())?;
            block_file.sync()?;

            tracing::info!("Created new store at {}", path.display());
            Ok(block_file)
        }
    }

    /// Read one full block
    pub fn read_block(&mut self, id: u32) -> Result<[u8; BLOCK_SIZE]> {
        self.check_block_id(id)?;

        self.file
            .seek(SeekFrom::Start(id as u64 * BLOCK_SIZE as u64))?;

        let mut block = [0u8; BLOCK_SIZE];
        self.file.read_exact(&mut block)?;
        Ok(block)
    }

    /// Write one full block
    pub fn write_block(&mut self, id: u32, block: &[u8; BLOCK_SIZE]) -> Result<()> {
        self.check_block_id(id)?;

        self.file
            .seek(SeekFrom::Start(id as u64 * BLOCK_SIZE as u64))?;
        self.file.write_all(block)?;
        Ok(())
    }

    /// Flush all written blocks to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// An out-of-range block id can only come from a corrupt chain pointer
    fn check_block_id(&self, id: u32) -> Result<()> {
        if id as usize >= TOTAL_BLOCKS {
            return Err(StoreError::CorruptStore(format!(
                "block id {} out of range (total {})",
                id, TOTAL_BLOCKS
            )));
        }
        Ok(())
    }
}
