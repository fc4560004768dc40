//! End-to-end tests of the six engine operations on a disk-backed store

use tempfile::TempDir;
use vdisk_rs::{DiskStore, EngineConfig, StorageEngine, VdiskError};

fn open(dir: &TempDir) -> StorageEngine<DiskStore> {
    let config = EngineConfig::small()
        .with_disk_path(dir.path().join("disk.bin"))
        .with_seed(42);
    StorageEngine::open(config).unwrap()
}

fn read_all(engine: &mut StorageEngine<DiskStore>, name: &str) -> Vec<i32> {
    let n = engine.entry(name).unwrap().element_count() as i64;
    engine.read_range(name, 0, n - 1).unwrap()
}

#[test]
fn test_backing_file_has_configured_size() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let len = std::fs::metadata(dir.path().join("disk.bin")).unwrap().len();
    assert_eq!(len, 4 * 1024 * 1024);
    assert!(engine.catalog().is_empty());
}

#[test]
fn test_create_then_read_returns_written_values() {
    let dir = TempDir::new().unwrap();
    let mut engine = open(&dir);

    engine.create_with_values("x", &[5, -4, 3, 2, 1]).unwrap();
    assert_eq!(engine.read_range("x", 0, 4).unwrap(), vec![5, -4, 3, 2, 1]);

    engine.create("y", 5).unwrap();
    assert_eq!(engine.read_range("y", 0, 4).unwrap().len(), 5);
}

#[test]
fn test_concatenate_scenario() {
    let dir = TempDir::new().unwrap();
    let mut engine = open(&dir);

    engine.create("a", 3).unwrap();
    engine.create("b", 2).unwrap();
    let a = read_all(&mut engine, "a");
    let b = read_all(&mut engine, "b");

    engine.concatenate("a", "b").unwrap();

    let listing = engine.list();
    assert_eq!(listing.files.len(), 1);
    assert_eq!(listing.files[0].name, "a");
    assert_eq!(listing.files[0].size, 5 * 4);

    let mut expected = a;
    expected.extend(b);
    assert_eq!(engine.read_range("a", 0, 4).unwrap(), expected);
}

#[test]
fn test_delete_restores_free_space() {
    let dir = TempDir::new().unwrap();
    let mut engine = open(&dir);

    let before = engine.list().free_bytes;
    engine.create("tmp", 10_000).unwrap();
    assert_eq!(engine.list().free_bytes, before - 40_000);

    engine.delete("tmp").unwrap();
    assert_eq!(engine.list().free_bytes, before);
}

#[test]
fn test_name_collision_keeps_first() {
    let dir = TempDir::new().unwrap();
    let mut engine = open(&dir);

    engine.create_with_values("dup", &[1, 2]).unwrap();
    let err = engine.create("dup", 50).unwrap_err();
    assert!(matches!(err, VdiskError::DuplicateName(_)));

    assert_eq!(read_all(&mut engine, "dup"), vec![1, 2]);
}

#[test]
fn test_boundary_reads() {
    let dir = TempDir::new().unwrap();
    let mut engine = open(&dir);
    engine.create("x", 10).unwrap();

    for (start, end) in [(5, 4), (-1, 0), (0, 10)] {
        let err = engine.read_range("x", start, end).unwrap_err();
        assert!(err.is_invalid_argument());
    }
    assert_eq!(engine.read_range("x", 9, 9).unwrap().len(), 1);
}

#[test]
fn test_sort_is_ordered_and_idempotent() {
    let dir = TempDir::new().unwrap();
    let mut engine = open(&dir);
    engine.create("s", 50_000).unwrap();

    engine.sort("s").unwrap();
    let once = read_all(&mut engine, "s");
    assert!(once.windows(2).all(|w| w[0] <= w[1]));

    engine.sort("s").unwrap();
    assert_eq!(read_all(&mut engine, "s"), once);
}

#[test]
fn test_mixed_workload_stays_consistent() {
    let dir = TempDir::new().unwrap();
    let mut engine = open(&dir);

    for i in 0..20 {
        engine.create(&format!("f{}", i), 500 + i * 700).unwrap();
    }
    for i in (0..20).step_by(3) {
        engine.delete(&format!("f{}", i)).unwrap();
    }
    engine.concatenate("f1", "f2").unwrap();
    engine.concatenate("f4", "f5").unwrap();
    engine.sort("f1").unwrap();
    engine.create("late", 3000).unwrap();

    engine.check_consistency().unwrap();
    let stats = engine.stats();
    assert_eq!(stats.file_count, 20 - 7 - 2 + 1);
    assert_eq!(stats.occupied_blocks, engine.catalog().occupied_blocks());
}
