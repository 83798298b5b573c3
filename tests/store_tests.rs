//! Tests for the block file and metadata block
//!
//! These tests verify:
//! - Store file creation and reopening
//! - Magic/version validation on open
//! - Metadata block encode/decode layout
//! - Bitmap allocation order and free-count bookkeeping
//! - Key directory scans

use blockkv::store::{
    BlockFile, Metadata, StorageEngine, BLOCK_SIZE, MAX_KEYS, TOTAL_BLOCKS,
};
use blockkv::StoreError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn temp_store_path(temp_dir: &TempDir) -> std::path::PathBuf {
    temp_dir.path().join("store.db")
}

// =============================================================================
// Block File Tests
// =============================================================================

#[test]
fn test_create_allocates_full_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_store_path(&temp_dir);

    let _file = BlockFile::open_or_create(&path).unwrap();

    let len = std::fs::metadata(&path).unwrap().len();
    assert_eq!(len, (TOTAL_BLOCKS * BLOCK_SIZE) as u64);
}

#[test]
fn test_fresh_store_metadata() {
    let temp_dir = TempDir::new().unwrap();
    let mut file = BlockFile::open_or_create(&temp_store_path(&temp_dir)).unwrap();

    let meta = Metadata::decode(&file.read_block(0).unwrap()).unwrap();

    assert_eq!(meta.total_blocks, TOTAL_BLOCKS as u32);
    assert_eq!(meta.free_blocks, (TOTAL_BLOCKS - 1) as u32);
    assert!(meta.is_used(0));
    assert!(!meta.is_used(1));
    assert_eq!(meta.key_count(), 0);
}

#[test]
fn test_reopen_existing_store() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_store_path(&temp_dir);

    {
        let mut file = BlockFile::open_or_create(&path).unwrap();
        let mut block = [0u8; BLOCK_SIZE];
        block[0] = 0xAB;
        file.write_block(42, &block).unwrap();
        file.sync().unwrap();
    }

    let mut file = BlockFile::open_or_create(&path).unwrap();
    let block = file.read_block(42).unwrap();
    assert_eq!(block[0], 0xAB);
    assert!(block[1..].iter().all(|&b| b == 0));
}

#[test]
fn test_open_rejects_garbage_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_store_path(&temp_dir);
    std::fs::write(&path, vec![0x55u8; BLOCK_SIZE * 2]).unwrap();

    let result = BlockFile::open_or_create(&path);
    assert!(matches!(result, Err(StoreError::CorruptStore(_))));
}

#[test]
fn test_open_rejects_wrong_version() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_store_path(&temp_dir);

    {
        let _file = BlockFile::open_or_create(&path).unwrap();
    }

    // Bump the version field in place (bytes 4..8 of block 0)
    let mut contents = std::fs::read(&path).unwrap();
    contents[4..8].copy_from_slice(&99u32.to_le_bytes());
    std::fs::write(&path, contents).unwrap();

    let result = BlockFile::open_or_create(&path);
    assert!(matches!(result, Err(StoreError::CorruptStore(_))));
}

#[test]
fn test_out_of_range_block_id() {
    let temp_dir = TempDir::new().unwrap();
    let mut file = BlockFile::open_or_create(&temp_store_path(&temp_dir)).unwrap();

    let result = file.read_block(TOTAL_BLOCKS as u32);
    assert!(matches!(result, Err(StoreError::CorruptStore(_))));
}

// =============================================================================
// Metadata Codec Tests
// =============================================================================

#[test]
fn test_metadata_wire_layout() {
    let block = Metadata::new().encode();

    // Magic 0xDEADBEEF little-endian
    assert_eq!(&block[0..4], &[0xEF, 0xBE, 0xAD, 0xDE]);
    // Version 1
    assert_eq!(&block[4..8], &[0x01, 0x00, 0x00, 0x00]);
    // Bitmap starts at offset 16; block 0 marked used
    assert_eq!(block[16], 0x01);
    // Rest of the bitmap clear
    assert!(block[17..16 + 2048].iter().all(|&b| b == 0));
}

#[test]
fn test_metadata_roundtrip() {
    let mut meta = Metadata::new();
    meta.mark_used(1);
    meta.mark_used(2);
    meta.entries[0].key = "alpha".to_string();
    meta.entries[0].first_block_id = 1;
    meta.entries[0].value_size = 5000;
    meta.entries[0].valid = true;

    let decoded = Metadata::decode(&meta.encode()).unwrap();

    assert_eq!(decoded.free_blocks, meta.free_blocks);
    assert!(decoded.is_used(1));
    assert!(decoded.is_used(2));
    assert!(!decoded.is_used(3));
    assert_eq!(decoded.entries[0].key, "alpha");
    assert_eq!(decoded.entries[0].first_block_id, 1);
    assert_eq!(decoded.entries[0].value_size, 5000);
    assert!(decoded.entries[0].valid);
    assert!(!decoded.entries[1].valid);
}

// =============================================================================
// Bitmap Allocator Tests
// =============================================================================

#[test]
fn test_find_free_block_skips_block_zero() {
    let meta = Metadata::new();
    assert_eq!(meta.find_free_block().unwrap(), 1);
}

#[test]
fn test_first_fit_ascending_order() {
    let mut meta = Metadata::new();

    assert_eq!(meta.find_free_block().unwrap(), 1);
    meta.mark_used(1);
    assert_eq!(meta.find_free_block().unwrap(), 2);
    meta.mark_used(2);
    assert_eq!(meta.find_free_block().unwrap(), 3);

    // Freeing a lower block makes it the next candidate again
    meta.mark_free(1);
    assert_eq!(meta.find_free_block().unwrap(), 1);

    // And once re-used, scanning resumes at the lowest hole
    meta.mark_used(1);
    assert_eq!(meta.find_free_block().unwrap(), 3);
}

#[test]
fn test_mark_adjusts_free_count() {
    let mut meta = Metadata::new();
    let initial = meta.free_blocks;

    meta.mark_used(7);
    assert_eq!(meta.free_blocks, initial - 1);

    meta.mark_free(7);
    assert_eq!(meta.free_blocks, initial);
}

#[test]
fn test_out_of_space_when_bitmap_full() {
    let mut meta = Metadata::new();
    for id in 1..TOTAL_BLOCKS {
        meta.mark_used(id as u32);
    }

    assert_eq!(meta.free_blocks, 0);
    assert!(matches!(meta.find_free_block(), Err(StoreError::OutOfSpace)));
}

// =============================================================================
// Key Directory Tests
// =============================================================================

#[test]
fn test_find_entry_exact_match_only() {
    let mut meta = Metadata::new();
    meta.entries[2].key = "needle".to_string();
    meta.entries[2].valid = true;

    assert_eq!(meta.find_entry("needle"), Some(2));
    assert_eq!(meta.find_entry("needl"), None);
    assert_eq!(meta.find_entry("needle2"), None);
}

#[test]
fn test_find_entry_ignores_invalid_slots() {
    let mut meta = Metadata::new();
    meta.entries[0].key = "ghost".to_string();
    meta.entries[0].valid = false;

    assert_eq!(meta.find_entry("ghost"), None);
}

#[test]
fn test_allocate_entry_slot_prefers_existing_key() {
    let mut meta = Metadata::new();
    meta.entries[3].key = "existing".to_string();
    meta.entries[3].valid = true;

    // Overwrite resolves to the existing slot, not slot 0
    assert_eq!(meta.allocate_entry_slot("existing").unwrap(), 3);
    // A new key takes the first invalid slot
    assert_eq!(meta.allocate_entry_slot("new").unwrap(), 0);
}

#[test]
fn test_allocate_entry_slot_directory_full() {
    let mut meta = Metadata::new();
    for (i, entry) in meta.entries.iter_mut().enumerate() {
        entry.key = format!("key{}", i);
        entry.valid = true;
    }
    assert_eq!(meta.key_count(), MAX_KEYS);

    let result = meta.allocate_entry_slot("overflow");
    assert!(matches!(result, Err(StoreError::DirectoryFull)));

    // An existing key still resolves even when the directory is full
    assert_eq!(meta.allocate_entry_slot("key4").unwrap(), 4);
}

// =============================================================================
// Engine Open Tests
// =============================================================================

#[test]
fn test_engine_open_creates_store() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_store_path(&temp_dir);

    let mut engine = StorageEngine::open(&path).unwrap();

    assert!(path.exists());
    assert_eq!(engine.free_blocks().unwrap(), (TOTAL_BLOCKS - 1) as u32);
    assert_eq!(engine.key_count().unwrap(), 0);
}
