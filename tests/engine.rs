//! End-to-end scenarios run against a real temp file.

use pagecache::{CacheConfig, Engine, Whence};

fn engine_over(capacity: usize) -> (Engine, tempfile::NamedTempFile) {
    let tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.as_file().set_len(64 * 1024 * 1024).expect("extend temp file");
    (Engine::new(CacheConfig { block_size: 4096, capacity }), tmp)
}

/// Scenario 1: write within a block, read it back through the cache,
/// then confirm the on-disk content after close.
#[test]
fn scenario_write_read_close_persists() {
    let (engine, tmp) = engine_over(4);
    let h = engine.open(tmp.path()).unwrap();

    let payload = vec![b'X'; 100];
    assert_eq!(engine.write(h, &payload).unwrap(), 100);

    assert_eq!(engine.lseek(h, 0, Whence::Set).unwrap(), 0);
    let mut buf = vec![0u8; 100];
    assert_eq!(engine.read(h, &mut buf).unwrap(), 100);
    assert_eq!(buf, payload);

    engine.close(h).unwrap();

    let on_disk = std::fs::read(tmp.path()).unwrap();
    assert_eq!(&on_disk[..100], payload.as_slice());
    assert!(on_disk[100..4096].iter().all(|&b| b == 0));
}

/// Scenario 2: four distinct blocks fill a capacity-4 cache; a fifth
/// write evicts and writes back the first-inserted block.
#[test]
fn scenario_capacity_stress_evicts_first_inserted() {
    let (engine, tmp) = engine_over(4);
    let h = engine.open(tmp.path()).unwrap();

    for i in 0..4u64 {
        engine.lseek(h, (i * 4096) as i64, Whence::Set).unwrap();
        engine.write(h, &vec![i as u8 + 1; 4096]).unwrap();
    }

    engine.lseek(h, 4 * 4096, Whence::Set).unwrap();
    engine.write(h, &vec![9u8; 4096]).unwrap();

    let on_disk = std::fs::read(tmp.path()).unwrap();
    assert!(on_disk[..4096].iter().all(|&b| b == 1), "evicted block must have been written back");
}

/// Scenario 3: ten sequential 1-byte reads starting at offset 0 all
/// return the right bytes, crossing the block boundary created by
/// read-ahead without the caller doing anything special.
#[test]
fn scenario_sequential_byte_reads_cross_block_boundary() {
    let (engine, tmp) = engine_over(4);
    {
        let mut f = tmp.reopen().unwrap();
        use std::io::Write;
        let pattern: Vec<u8> = (0..4100u32).map(|i| (i % 251) as u8).collect();
        f.write_all(&pattern).unwrap();
    }

    let h = engine.open(tmp.path()).unwrap();
    let mut collected = Vec::new();
    for _ in 0..10 {
        let mut b = [0u8; 1];
        assert_eq!(engine.read(h, &mut b).unwrap(), 1);
        collected.push(b[0]);
    }

    let expected: Vec<u8> = (0..10u32).map(|i| (i % 251) as u8).collect();
    assert_eq!(collected, expected);
}

/// Scenario 4: a second `fsync` after one that already cleaned
/// everything touches no additional dirty blocks.
#[test]
fn scenario_double_fsync_is_idempotent() {
    let (engine, tmp) = engine_over(4);
    let h = engine.open(tmp.path()).unwrap();

    engine.lseek(h, 10, Whence::Set).unwrap();
    engine.write(h, b"P").unwrap();
    engine.fsync(h).unwrap();
    engine.fsync(h).unwrap();

    let on_disk = std::fs::read(tmp.path()).unwrap();
    assert_eq!(on_disk[10], b'P');
}

/// Scenario 5: two threads writing disjoint byte ranges within the same
/// block leave both writes intact with no interleaving corruption.
#[test]
fn scenario_concurrent_disjoint_writes_do_not_corrupt_the_block() {
    let (engine, tmp) = engine_over(4);
    let h = engine.open(tmp.path()).unwrap();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            engine.lseek(h, 0, Whence::Set).unwrap();
            engine.write(h, &[1u8; 2048]).unwrap();
        });
        scope.spawn(|| {
            engine.lseek(h, 2048, Whence::Set).unwrap();
            engine.write(h, &[2u8; 2048]).unwrap();
        });
    });

    engine.fsync(h).unwrap();
    let on_disk = std::fs::read(tmp.path()).unwrap();
    assert!(on_disk[..2048].iter().all(|&b| b == 1));
    assert!(on_disk[2048..4096].iter().all(|&b| b == 2));
}

/// Scenario 6: a single read never returns more than one block's worth
/// of bytes, regardless of how much the caller asked for.
#[test]
fn scenario_read_caps_at_one_block() {
    let (engine, tmp) = engine_over(4);
    let h = engine.open(tmp.path()).unwrap();

    let mut buf = vec![0u8; 8192];
    let n = engine.read(h, &mut buf).unwrap();
    assert!(n <= 4096);
}

#[test]
fn lseek_cur_tracks_cumulative_advances() {
    let (engine, tmp) = engine_over(4);
    let h = engine.open(tmp.path()).unwrap();

    engine.write(h, b"abcd").unwrap();
    engine.lseek(h, 2, Whence::Cur).unwrap();
    let pos = engine.lseek(h, 0, Whence::Cur).unwrap();
    assert_eq!(pos, 6);
}

/// A write-miss on a region with pre-existing on-disk content does not
/// read that content first: the untouched remainder of the block is
/// zero-filled and overwrites the old bytes on write-back.
#[test]
fn write_miss_does_not_read_from_device_and_zero_fills_the_rest() {
    let (engine, tmp) = engine_over(4);
    {
        use std::io::Write;
        let mut f = tmp.reopen().unwrap();
        f.write_all(&[0xABu8; 4096]).unwrap();
    }

    let h = engine.open(tmp.path()).unwrap();
    engine.lseek(h, 50, Whence::Set).unwrap();
    engine.write(h, b"hi").unwrap();
    engine.close(h).unwrap();

    let on_disk = std::fs::read(tmp.path()).unwrap();
    assert!(on_disk[..50].iter().all(|&b| b == 0), "untouched prefix must be zero-filled, not read from disk");
    assert_eq!(&on_disk[50..52], b"hi");
    assert!(on_disk[52..4096].iter().all(|&b| b == 0), "untouched suffix must be zero-filled, not read from disk");
}

#[test]
fn read_past_end_of_file_returns_fewer_bytes_not_an_error() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.as_file().set_len(10).unwrap();
    let engine = Engine::new(CacheConfig { block_size: 4096, capacity: 4 });
    let h = engine.open(tmp.path()).unwrap();

    let mut buf = vec![0xffu8; 4096];
    let n = engine.read(h, &mut buf).unwrap();
    assert_eq!(n, 4096);
    assert!(buf[10..].iter().all(|&b| b == 0), "short read must zero-pad the tail");
}
