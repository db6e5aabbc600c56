//! Stress tests for concurrency and durability.

use blockwal::{Options, Wal, BLOCK_SIZE, MB};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

/// Concurrent writers: every record must be readable at its returned
/// position, and the full set must replay exactly once.
#[test]
fn stress_concurrent_writers() {
    let dir = TempDir::new().unwrap();
    let wal = Arc::new(
        Wal::open(
            Options::new(dir.path())
                .with_segment_size(2 * MB)
                .with_block_cache(32 * BLOCK_SIZE as u32),
        )
        .unwrap(),
    );

    let num_threads = 8;
    let records_per_thread = 500;

    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let wal = Arc::clone(&wal);
            thread::spawn(move || {
                let mut written = Vec::new();
                for i in 0..records_per_thread {
                    let data = format!("thread{:02}_record{:05}", t, i).into_bytes();
                    let pos = wal.write(&data).unwrap();
                    written.push((data, pos));
                }
                written
            })
        })
        .collect();

    let mut all_written = Vec::new();
    for handle in handles {
        all_written.extend(handle.join().unwrap());
    }

    // Every record reads back from its own position.
    for (data, pos) in &all_written {
        assert_eq!(&wal.read(pos).unwrap()[..], &data[..]);
    }

    // Replay sees each record exactly once, keyed by position.
    let mut by_position: HashMap<_, _> = all_written
        .iter()
        .map(|(data, pos)| (*pos, data.clone()))
        .collect();

    let mut reader = wal.new_reader();
    while let Some((payload, pos)) = reader.next().unwrap() {
        let expected = by_position.remove(&pos).expect("unexpected position");
        assert_eq!(&payload[..], &expected[..]);
    }
    assert!(by_position.is_empty());
}

/// Readers running concurrently with writers never observe partial or
/// corrupt records.
#[test]
fn stress_concurrent_readers_and_writers() {
    let dir = TempDir::new().unwrap();
    let wal = Arc::new(
        Wal::open(
            Options::new(dir.path())
                .with_segment_size(2 * MB)
                .with_block_cache(32 * BLOCK_SIZE as u32),
        )
        .unwrap(),
    );

    // Seed some records so readers have work from the start.
    let mut seeded = Vec::new();
    for i in 0..200 {
        let data = format!("seed-{:04}", i).into_bytes();
        let pos = wal.write(&data).unwrap();
        seeded.push((data, pos));
    }
    let seeded = Arc::new(seeded);

    let writer = {
        let wal = Arc::clone(&wal);
        thread::spawn(move || {
            for i in 0..2_000 {
                let data = vec![b'w'; 64 + i % 1024];
                let pos = wal.write(&data).unwrap();
                assert_eq!(&wal.read(&pos).unwrap()[..], &data[..]);
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let wal = Arc::clone(&wal);
            let seeded = Arc::clone(&seeded);
            thread::spawn(move || {
                for _ in 0..50 {
                    for (data, pos) in seeded.iter() {
                        assert_eq!(&wal.read(pos).unwrap()[..], &data[..]);
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}

/// Alternating batched and plain writes across many roll-overs stay
/// consistent after a reopen.
#[test]
fn stress_mixed_writes_with_reopen() {
    let dir = TempDir::new().unwrap();
    let opts = Options::new(dir.path())
        .with_segment_size(MB)
        .with_block_cache(16 * BLOCK_SIZE as u32);

    let mut written = Vec::new();
    {
        let wal = Wal::open(opts.clone()).unwrap();
        for round in 0..50 {
            for i in 0..20 {
                let data = format!("plain-{:03}-{:03}", round, i).into_bytes();
                let pos = wal.write(&data).unwrap();
                written.push((data, pos));
            }

            let batch: Vec<Vec<u8>> = (0..20)
                .map(|i| vec![b'm'; 256 + (round * 20 + i) % 4096])
                .collect();
            for data in &batch {
                wal.pending_writes(data).unwrap();
            }
            let positions = wal.write_all().unwrap();
            for (data, pos) in batch.into_iter().zip(positions) {
                written.push((data, pos));
            }
        }
        wal.close().unwrap();
    }

    let wal = Wal::open(opts).unwrap();
    let mut reader = wal.new_reader();
    for (data, pos) in &written {
        let (payload, position) = reader.next().unwrap().unwrap();
        assert_eq!(&payload[..], &data[..]);
        assert_eq!(&position, pos);
    }
    assert!(reader.next().unwrap().is_none());
}
