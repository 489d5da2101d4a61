//! Combines `ferry-files` reassembly output with `ferry-storage`'s
//! admission policy: finished transfers get stored under quota, and an
//! over-quota admission evicts an older finished transfer rather than being
//! rejected outright.

use ferry_core::config::EvictionPolicy;
use ferry_core::types::TransferId;
use ferry_files::assembler::ChunkAssembler;
use ferry_integration_tests::{split_all, write_and_describe};
use ferry_storage::{LocalFsBackend, PolicyEngine, StorageManager};
use std::sync::Arc;
use tempfile::tempdir;

const CHUNK_SIZE: u32 = 32;

async fn assemble_and_read(src_dir: &std::path::Path, out_dir: &std::path::Path, name: &str, size: usize) -> Vec<u8> {
    let data: Vec<u8> = (0..size).map(|i| (i % 200) as u8).collect();
    let (path, meta) = write_and_describe(src_dir, name, &data, CHUNK_SIZE);
    let id = TransferId::new_v4();
    let chunks = split_all(&path, id, CHUNK_SIZE);

    let assembler = ChunkAssembler::new(out_dir);
    assembler.start_session(id, &meta).unwrap();
    for chunk in &chunks {
        assembler.process_chunk(&chunk).unwrap();
    }
    let final_path = assembler.finalize(id, Some(meta.sha256_hash)).unwrap();
    std::fs::read(final_path).unwrap()
}

#[tokio::test]
async fn finished_transfers_are_admitted_and_older_ones_evicted_under_quota() {
    let src_dir = tempdir().unwrap();
    let assembled_dir = tempdir().unwrap();
    let store_dir = tempdir().unwrap();

    let first = assemble_and_read(src_dir.path(), assembled_dir.path(), "a.bin", 100).await;
    let second = assemble_and_read(src_dir.path(), assembled_dir.path(), "b.bin", 40).await;

    let backend = Arc::new(LocalFsBackend::new(store_dir.path()).await.unwrap());
    let manager = StorageManager::new(backend, true);
    let policy = PolicyEngine::new(1000, 150, EvictionPolicy::Lru);

    policy.admit(&manager, "a.bin", first.clone()).await.unwrap();
    policy.admit(&manager, "b.bin", second.clone()).await.unwrap();

    // Touch "b.bin" so "a.bin" becomes the least recently accessed.
    assert_eq!(manager.get("b.bin").await.unwrap(), second);

    let third = assemble_and_read(src_dir.path(), assembled_dir.path(), "c.bin", 50).await;
    policy.admit(&manager, "c.bin", third.clone()).await.unwrap();

    assert!(!manager.backend().exists("a.bin").await.unwrap());
    assert_eq!(manager.get("b.bin").await.unwrap(), second);
    assert_eq!(manager.get("c.bin").await.unwrap(), third);
    assert_eq!(manager.file_count(), 2);
}

#[tokio::test]
async fn pinning_a_finished_transfer_survives_quota_pressure() {
    let src_dir = tempdir().unwrap();
    let assembled_dir = tempdir().unwrap();
    let store_dir = tempdir().unwrap();

    let important = assemble_and_read(src_dir.path(), assembled_dir.path(), "important.bin", 90).await;

    let backend = Arc::new(LocalFsBackend::new(store_dir.path()).await.unwrap());
    let manager = StorageManager::new(backend, true);
    let policy = PolicyEngine::new(1000, 100, EvictionPolicy::Fifo);

    policy.admit(&manager, "important.bin", important).await.unwrap();
    policy.pin("important.bin");

    let result = policy.admit(&manager, "overflow.bin", vec![0u8; 50]).await;
    assert!(result.is_err());
    assert!(manager.backend().exists("important.bin").await.unwrap());
}
