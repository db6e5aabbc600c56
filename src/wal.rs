//! Write-ahead log: the public entry point.
//!
//! A [`Wal`] owns one active segment and a map of older, sealed segments. It
//! dispatches positional reads, rolls the active segment over when a write
//! would exceed the configured size, stages batched writes, and enforces the
//! durability policy (fsync per write, or per accumulated bytes).
//!
//! # Thread Safety
//!
//! The `Wal` is thread-safe and can be shared across threads using `Arc`.
//! Writers are serialized by an exclusive lock; readers take a shared lock
//! and never observe partial writes.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::cache::BlockCache;
use crate::chunk::ChunkPosition;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::segment::{
    parse_segment_file_name, plan_write, segment_file_path, Segment, SegmentId, SegmentReader,
};
use crate::{BLOCK_SIZE, CHUNK_HEADER_SIZE};

/// Mutable state guarded by the WAL's reader-writer lock.
struct WalInner {
    /// Segment currently accepting writes.
    active: Arc<Segment>,
    /// Sealed segments by id. Every sealed id is smaller than the active id.
    older: HashMap<SegmentId, Arc<Segment>>,
    /// Shared block cache, handed to every segment. `None` when disabled.
    cache: Option<Arc<BlockCache>>,
    /// Staged records awaiting `write_all`.
    pending: Vec<Vec<u8>>,
    /// Conservative framed size of the staged records.
    pending_size: u64,
    /// Bytes appended since the last fsync.
    bytes_written: u32,
    /// Current segment file extension; `rename_file_ext` updates it.
    ext: String,
    closed: bool,
}

/// A durable, append-only write-ahead log.
///
/// See the crate-level documentation for an overview and examples.
pub struct Wal {
    options: Options,
    inner: RwLock<WalInner>,
}

impl Wal {
    /// Open a write-ahead log in the directory named by the options,
    /// creating it if absent.
    ///
    /// Existing segment files are scanned; the one with the greatest id
    /// becomes the active segment and the rest are sealed. An empty directory
    /// starts with segment 1.
    pub fn open(options: Options) -> Result<Self> {
        options.validate()?;
        fs::create_dir_all(&options.dir_path)?;

        let cache = if options.block_cache > 0 {
            Some(Arc::new(BlockCache::with_byte_capacity(options.block_cache)))
        } else {
            None
        };

        // Collect segment ids; anything that does not parse as a segment
        // file name is ignored.
        let mut ids: Vec<SegmentId> = Vec::new();
        for entry in fs::read_dir(&options.dir_path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = parse_segment_file_name(name, &options.segment_file_ext) {
                ids.push(id);
            }
        }

        let mut older = HashMap::new();
        let active = if ids.is_empty() {
            Arc::new(Segment::open(
                &options.dir_path,
                &options.segment_file_ext,
                1,
                cache.clone(),
            )?)
        } else {
            ids.sort_unstable();
            let last = *ids.last().unwrap();
            let mut active = None;
            for &id in &ids {
                let segment = Arc::new(Segment::open(
                    &options.dir_path,
                    &options.segment_file_ext,
                    id,
                    cache.clone(),
                )?);
                if id == last {
                    active = Some(segment);
                } else {
                    older.insert(id, segment);
                }
            }
            active.unwrap()
        };

        let ext = options.segment_file_ext.clone();
        Ok(Self {
            options,
            inner: RwLock::new(WalInner {
                active,
                older,
                cache,
                pending: Vec::new(),
                pending_size: 0,
                bytes_written: 0,
                ext,
                closed: false,
            }),
        })
    }

    /// Append a record and return its position.
    ///
    /// Rolls the active segment over first if the framed record would push it
    /// past the configured segment size, then applies the sync policy.
    pub fn write(&self, data: &[u8]) -> Result<ChunkPosition> {
        let mut inner = self.inner.write();
        self.write_locked(&mut inner, data)
    }

    fn write_locked(&self, inner: &mut WalInner, data: &[u8]) -> Result<ChunkPosition> {
        if inner.closed {
            return Err(Error::Closed);
        }

        let segment_size = self.options.segment_size;
        if (data.len() + CHUNK_HEADER_SIZE) as u64 > segment_size {
            return Err(Error::ValueTooLarge {
                size: data.len(),
                max: (segment_size as usize).saturating_sub(CHUNK_HEADER_SIZE),
            });
        }

        if inner.active.size() + (data.len() + CHUNK_HEADER_SIZE) as u64 > segment_size {
            self.roll_active(inner)?;
        }

        let position = inner.active.write(data)?;
        inner.bytes_written = inner.bytes_written.saturating_add(position.chunk_size);

        let need_sync = self.options.sync
            || (self.options.bytes_per_sync > 0
                && inner.bytes_written >= self.options.bytes_per_sync);
        if need_sync {
            inner.active.sync()?;
            inner.bytes_written = 0;
        }

        Ok(position)
    }

    /// Fsync the active segment, seal it, and install a new empty segment
    /// with the next id.
    fn roll_active(&self, inner: &mut WalInner) -> Result<()> {
        inner.active.sync()?;
        inner.bytes_written = 0;

        let next_id = inner.active.id() + 1;
        let segment = Arc::new(Segment::open(
            &self.options.dir_path,
            &inner.ext,
            next_id,
            inner.cache.clone(),
        )?);

        let sealed = std::mem::replace(&mut inner.active, segment);
        inner.older.insert(sealed.id(), sealed);
        Ok(())
    }

    /// Stage a record for a later [`write_all`](Self::write_all).
    ///
    /// The record is copied. Staging is refused once the conservative framed
    /// size of all staged records would exceed the segment size.
    pub fn pending_writes(&self, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(Error::Closed);
        }

        let bound = max_framed_size(data.len() as u64);
        if inner.pending_size + bound > self.options.segment_size {
            return Err(Error::PendingSizeTooLarge {
                size: inner.pending_size + bound,
                max: self.options.segment_size,
            });
        }

        inner.pending_size += bound;
        inner.pending.push(data.to_vec());
        Ok(())
    }

    /// Write every staged record and return their positions in submission
    /// order.
    ///
    /// Positions are computed up front by simulating the writes (including
    /// padding and segment roll-over) against the active segment's counters;
    /// the records are then appended. Staging is cleared only when every
    /// record was written; a mid-batch failure returns the error and leaves
    /// the staging intact, with whatever was already appended remaining on
    /// disk.
    pub fn write_all(&self) -> Result<Vec<ChunkPosition>> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(Error::Closed);
        }
        if inner.pending.is_empty() {
            return Ok(Vec::new());
        }

        // Pass 1: simulate, using the same planner the segment write path
        // executes.
        let segment_size = self.options.segment_size;
        let mut sim_id = inner.active.id();
        let mut sim_size = inner.active.size();
        let mut sim_block = (sim_size / BLOCK_SIZE as u64) as u32;
        let mut sim_offset = (sim_size % BLOCK_SIZE as u64) as u32;

        let mut positions = Vec::with_capacity(inner.pending.len());
        for data in &inner.pending {
            if (data.len() + CHUNK_HEADER_SIZE) as u64 > segment_size {
                return Err(Error::ValueTooLarge {
                    size: data.len(),
                    max: (segment_size as usize).saturating_sub(CHUNK_HEADER_SIZE),
                });
            }

            if sim_size + (data.len() + CHUNK_HEADER_SIZE) as u64 > segment_size {
                sim_id += 1;
                sim_size = 0;
                sim_block = 0;
                sim_offset = 0;
            }

            let plan = plan_write(sim_block, sim_offset, data.len() as u32);
            positions.push(ChunkPosition {
                segment_id: sim_id,
                block_number: plan.start_block,
                chunk_offset: plan.start_offset as i64,
                chunk_size: plan.chunk_size,
            });

            sim_block = plan.end_block;
            sim_offset = plan.end_offset;
            sim_size += plan.padding as u64 + plan.chunk_size as u64;
        }

        // Pass 2: perform the writes.
        let pending = std::mem::take(&mut inner.pending);
        for i in 0..pending.len() {
            match self.write_locked(&mut inner, &pending[i]) {
                Ok(position) => debug_assert_eq!(position, positions[i]),
                Err(err) => {
                    inner.pending = pending;
                    return Err(err);
                }
            }
        }

        inner.pending_size = 0;
        Ok(positions)
    }

    /// Read the record at the given position.
    pub fn read(&self, position: &ChunkPosition) -> Result<Bytes> {
        let inner = self.inner.read();
        if inner.closed {
            return Err(Error::Closed);
        }

        let segment = if position.segment_id == inner.active.id() {
            Arc::clone(&inner.active)
        } else {
            inner
                .older
                .get(&position.segment_id)
                .cloned()
                .ok_or(Error::SegmentNotFound(position.segment_id))?
        };

        segment.read(position.block_number, position.chunk_offset)
    }

    /// A reader over every segment, in ascending segment order.
    pub fn new_reader(&self) -> Reader {
        self.new_reader_with_max(0)
    }

    /// A reader over the segments whose id is at most `max_id`
    /// (0 means no bound), in ascending segment order.
    pub fn new_reader_with_max(&self, max_id: SegmentId) -> Reader {
        let inner = self.inner.read();

        let mut segments: Vec<Arc<Segment>> = inner
            .older
            .values()
            .filter(|segment| max_id == 0 || segment.id() <= max_id)
            .cloned()
            .collect();
        if max_id == 0 || inner.active.id() <= max_id {
            segments.push(Arc::clone(&inner.active));
        }
        segments.sort_unstable_by_key(|segment| segment.id());

        Reader {
            readers: segments.iter().map(|segment| segment.reader()).collect(),
            current: 0,
        }
    }

    /// A reader positioned at the first record whose starting position is at
    /// or past `start`.
    ///
    /// Segments before the requested one are skipped wholesale. If `start`
    /// lies past every record, the reader reports end-of-log on the first
    /// call to `next`.
    pub fn new_reader_with_start(&self, start: &ChunkPosition) -> Result<Reader> {
        let mut reader = self.new_reader();
        let target = start.block_number as i64 * BLOCK_SIZE as i64 + start.chunk_offset;

        loop {
            let Some(current) = reader.readers.get(reader.current) else {
                break;
            };

            let segment_id = current.segment_id();
            if segment_id < start.segment_id {
                reader.current += 1;
                continue;
            }
            if segment_id > start.segment_id {
                break;
            }

            let (block_number, chunk_offset) = current.position();
            let cursor = block_number as i64 * BLOCK_SIZE as i64 + chunk_offset;
            if cursor >= target {
                break;
            }

            if reader.next()?.is_none() {
                break;
            }
        }

        Ok(reader)
    }

    /// Id of the active segment.
    pub fn active_segment_id(&self) -> SegmentId {
        self.inner.read().active.id()
    }

    /// True when the log holds no records: a single segment of size zero.
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read();
        inner.older.is_empty() && inner.active.size() == 0
    }

    /// Seal the active segment and open an empty one with the next id.
    /// For callers that need a clean segment boundary.
    pub fn open_new_active_segment(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(Error::Closed);
        }
        self.roll_active(&mut inner)
    }

    /// Fsync the active segment.
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Ok(());
        }
        inner.bytes_written = 0;
        inner.active.sync()
    }

    /// Purge the cache, close every segment, and clear the sealed map.
    /// Idempotent.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Ok(());
        }

        if let Some(cache) = &inner.cache {
            cache.purge();
        }

        for segment in inner.older.values() {
            segment.close()?;
        }
        inner.active.close()?;

        inner.older.clear();
        inner.closed = true;
        Ok(())
    }

    /// Purge the cache and unlink every segment file. The log is unusable
    /// afterwards; re-open it to start fresh.
    pub fn delete(&self) -> Result<()> {
        let mut inner = self.inner.write();

        if let Some(cache) = &inner.cache {
            cache.purge();
        }

        let older = std::mem::take(&mut inner.older);
        for segment in older.values() {
            segment.remove()?;
        }
        inner.active.remove()?;
        inner.closed = true;
        Ok(())
    }

    /// Rename every segment file to use `new_ext`. The log must be closed;
    /// re-open it with the new extension afterwards.
    pub fn rename_file_ext(&self, new_ext: &str) -> Result<()> {
        if !new_ext.starts_with('.') {
            return Err(Error::invalid_option(
                "segment file extension must start with '.'",
            ));
        }

        let mut inner = self.inner.write();
        if !inner.closed {
            return Err(Error::invalid_option(
                "the wal must be closed before renaming segment files",
            ));
        }

        for entry in fs::read_dir(&self.options.dir_path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = parse_segment_file_name(name, &inner.ext) {
                fs::rename(
                    entry.path(),
                    segment_file_path(&self.options.dir_path, new_ext, id),
                )?;
            }
        }

        inner.ext = new_ext.to_string();
        Ok(())
    }
}

/// Conservative upper bound on the framed size of a record: payload, one
/// header, and one extra header per block boundary the record could cross.
fn max_framed_size(len: u64) -> u64 {
    let header = CHUNK_HEADER_SIZE as u64;
    header + len + (len / BLOCK_SIZE as u64 + 1) * header
}

/// Ordered reader over multiple segments, yielding `(payload, position)`
/// pairs in log order.
pub struct Reader {
    readers: Vec<SegmentReader>,
    current: usize,
}

impl Reader {
    /// Read the next record, crossing segment boundaries as needed. Returns
    /// `None` at the end of the log.
    pub fn next(&mut self) -> Result<Option<(Bytes, ChunkPosition)>> {
        while let Some(reader) = self.readers.get_mut(self.current) {
            match reader.next()? {
                Some(item) => return Ok(Some(item)),
                None => self.current += 1,
            }
        }
        Ok(None)
    }

    /// Id of the segment the cursor is currently in, or `None` once the
    /// reader is exhausted.
    pub fn current_segment_id(&self) -> Option<SegmentId> {
        self.readers.get(self.current).map(|r| r.segment_id())
    }
}

impl Iterator for Reader {
    type Item = Result<(Bytes, ChunkPosition)>;

    fn next(&mut self) -> Option<Self::Item> {
        match Reader::next(self) {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_options(dir: &TempDir) -> Options {
        Options::new(dir.path()).with_segment_size(32 * crate::MB)
    }

    #[test]
    fn test_open_empty_dir_bootstraps_segment_one() {
        let dir = TempDir::new().unwrap();
        let wal = Wal::open(test_options(&dir)).unwrap();

        assert!(wal.is_empty());
        assert_eq!(wal.active_segment_id(), 1);
        assert!(dir.path().join("000000001.SEG").exists());
    }

    #[test]
    fn test_open_rejects_invalid_options() {
        let dir = TempDir::new().unwrap();
        let options = Options::new(dir.path()).with_segment_file_ext("SEG");
        assert!(matches!(
            Wal::open(options),
            Err(Error::InvalidOption(_))
        ));
    }

    #[test]
    fn test_write_and_read() {
        let dir = TempDir::new().unwrap();
        let wal = Wal::open(test_options(&dir)).unwrap();

        let pos1 = wal.write(b"hello1").unwrap();
        let pos2 = wal.write(b"hello2").unwrap();
        let pos3 = wal.write(b"hello3").unwrap();

        assert_eq!(&wal.read(&pos1).unwrap()[..], b"hello1");
        assert_eq!(&wal.read(&pos2).unwrap()[..], b"hello2");
        assert_eq!(&wal.read(&pos3).unwrap()[..], b"hello3");
        assert!(!wal.is_empty());
    }

    #[test]
    fn test_value_too_large() {
        let dir = TempDir::new().unwrap();
        let options = Options::new(dir.path()).with_segment_size(4096).with_block_cache(0);
        let wal = Wal::open(options).unwrap();

        // Exactly at the limit is fine.
        wal.write(&vec![0u8; 4096 - CHUNK_HEADER_SIZE]).unwrap();

        let err = wal.write(&vec![0u8; 4096]).unwrap_err();
        assert!(matches!(err, Error::ValueTooLarge { .. }));
    }

    #[test]
    fn test_segment_rollover() {
        let dir = TempDir::new().unwrap();
        let options = Options::new(dir.path())
            .with_segment_size(crate::MB)
            .with_block_cache(0);
        let wal = Wal::open(options).unwrap();

        let data = vec![b'r'; 16 * 1024];
        let mut positions = Vec::new();
        // ~4MB of records across a 1MB segment size forces several roll-overs.
        for _ in 0..256 {
            positions.push(wal.write(&data).unwrap());
        }

        assert!(wal.active_segment_id() > 1);
        assert_eq!(positions.last().unwrap().segment_id, wal.active_segment_id());

        // Sealed segments still serve reads.
        for pos in &positions {
            assert_eq!(&wal.read(pos).unwrap()[..], &data[..]);
        }
    }

    #[test]
    fn test_read_unknown_segment() {
        let dir = TempDir::new().unwrap();
        let wal = Wal::open(test_options(&dir)).unwrap();
        wal.write(b"data").unwrap();

        let bogus = ChunkPosition {
            segment_id: 99,
            block_number: 0,
            chunk_offset: 0,
            chunk_size: 11,
        };
        assert!(matches!(
            wal.read(&bogus),
            Err(Error::SegmentNotFound(99))
        ));
    }

    #[test]
    fn test_reopen_recovers_segments() {
        let dir = TempDir::new().unwrap();
        let data = vec![b'p'; 32 * 1024];
        let positions = {
            let options = Options::new(dir.path())
                .with_segment_size(crate::MB)
                .with_block_cache(0);
            let wal = Wal::open(options).unwrap();
            let positions: Vec<_> = (0..64).map(|_| wal.write(&data).unwrap()).collect();
            wal.close().unwrap();
            positions
        };

        let options = Options::new(dir.path())
            .with_segment_size(crate::MB)
            .with_block_cache(0);
        let wal = Wal::open(options).unwrap();
        assert!(wal.active_segment_id() > 1);
        for pos in &positions {
            assert_eq!(&wal.read(pos).unwrap()[..], &data[..]);
        }

        // Appending continues in the recovered active segment.
        let pos = wal.write(&data).unwrap();
        assert_eq!(&wal.read(&pos).unwrap()[..], &data[..]);
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_operations() {
        let dir = TempDir::new().unwrap();
        let wal = Wal::open(test_options(&dir)).unwrap();
        let pos = wal.write(b"data").unwrap();

        wal.close().unwrap();
        wal.close().unwrap();

        assert!(matches!(wal.write(b"more"), Err(Error::Closed)));
        assert!(matches!(wal.read(&pos), Err(Error::Closed)));
        assert!(matches!(wal.pending_writes(b"x"), Err(Error::Closed)));
        assert!(matches!(wal.write_all(), Err(Error::Closed)));
        assert!(matches!(wal.open_new_active_segment(), Err(Error::Closed)));
        wal.sync().unwrap();
    }

    #[test]
    fn test_write_all_positions() {
        let dir = TempDir::new().unwrap();
        let wal = Wal::open(test_options(&dir)).unwrap();

        wal.write(b"before").unwrap();

        wal.pending_writes(b"batch-1").unwrap();
        wal.pending_writes(&vec![b'b'; BLOCK_SIZE + 100]).unwrap();
        wal.pending_writes(b"batch-3").unwrap();

        let positions = wal.write_all().unwrap();
        assert_eq!(positions.len(), 3);

        assert_eq!(&wal.read(&positions[0]).unwrap()[..], b"batch-1");
        assert_eq!(wal.read(&positions[1]).unwrap().len(), BLOCK_SIZE + 100);
        assert_eq!(&wal.read(&positions[2]).unwrap()[..], b"batch-3");

        // Staging is cleared: a second flush writes nothing.
        assert!(wal.write_all().unwrap().is_empty());
    }

    #[test]
    fn test_write_all_across_rollover() {
        let dir = TempDir::new().unwrap();
        let options = Options::new(dir.path())
            .with_segment_size(crate::MB)
            .with_block_cache(0);
        let wal = Wal::open(options).unwrap();

        // Leave little room in segment 1.
        let filler = vec![b'f'; 1000 * 1024];
        wal.write(&filler).unwrap();
        assert_eq!(wal.active_segment_id(), 1);

        wal.pending_writes(b"small").unwrap();
        wal.pending_writes(&vec![b'g'; 64 * 1024]).unwrap();
        let positions = wal.write_all().unwrap();

        // The second staged record did not fit and landed in segment 2,
        // exactly as the simulated positions predicted.
        assert_eq!(positions[0].segment_id, 1);
        assert_eq!(positions[1].segment_id, 2);
        assert_eq!(positions[1].block_number, 0);
        assert_eq!(positions[1].chunk_offset, 0);

        assert_eq!(&wal.read(&positions[0]).unwrap()[..], b"small");
        assert_eq!(wal.read(&positions[1]).unwrap().len(), 64 * 1024);
    }

    #[test]
    fn test_pending_size_too_large() {
        let dir = TempDir::new().unwrap();
        let options = Options::new(dir.path())
            .with_segment_size(64 * 1024)
            .with_block_cache(0);
        let wal = Wal::open(options).unwrap();

        wal.pending_writes(&vec![0u8; 40 * 1024]).unwrap();
        let err = wal.pending_writes(&vec![0u8; 40 * 1024]).unwrap_err();
        assert!(matches!(err, Error::PendingSizeTooLarge { .. }));

        // The earlier staged record is still there and flushes fine.
        let positions = wal.write_all().unwrap();
        assert_eq!(positions.len(), 1);
    }

    #[test]
    fn test_reader_yields_in_write_order() {
        let dir = TempDir::new().unwrap();
        let options = Options::new(dir.path())
            .with_segment_size(64 * 1024)
            .with_block_cache(0);
        let wal = Wal::open(options).unwrap();

        let mut expected = Vec::new();
        for i in 0..500 {
            let data = format!("record-{:05}", i).repeat(1 + i % 50);
            let pos = wal.write(data.as_bytes()).unwrap();
            expected.push((data, pos));
        }
        assert!(wal.active_segment_id() > 1);

        let mut reader = wal.new_reader();
        for (data, pos) in &expected {
            let (payload, position) = reader.next().unwrap().unwrap();
            assert_eq!(&payload[..], data.as_bytes());
            assert_eq!(&position, pos);
        }
        assert!(reader.next().unwrap().is_none());
    }

    #[test]
    fn test_reader_iterator_adapter() {
        let dir = TempDir::new().unwrap();
        let wal = Wal::open(test_options(&dir)).unwrap();

        for i in 0..10 {
            wal.write(format!("it-{}", i).as_bytes()).unwrap();
        }

        let collected: Vec<_> = wal
            .new_reader()
            .map(|item| item.unwrap())
            .collect();
        assert_eq!(collected.len(), 10);
        assert_eq!(&collected[3].0[..], b"it-3");
    }

    #[test]
    fn test_reader_with_max_segment_id() {
        let dir = TempDir::new().unwrap();
        let options = Options::new(dir.path())
            .with_segment_size(64 * 1024)
            .with_block_cache(0);
        let wal = Wal::open(options).unwrap();

        let data = vec![b'm'; 8 * 1024];
        for _ in 0..32 {
            wal.write(&data).unwrap();
        }
        assert!(wal.active_segment_id() >= 3);

        let mut reader = wal.new_reader_with_max(2);
        let mut max_seen = 0;
        while let Some((_, pos)) = reader.next().unwrap() {
            max_seen = max_seen.max(pos.segment_id);
        }
        assert_eq!(max_seen, 2);
    }

    #[test]
    fn test_reader_with_start_past_end_is_eof() {
        let dir = TempDir::new().unwrap();
        let wal = Wal::open(test_options(&dir)).unwrap();
        wal.write(b"only").unwrap();

        let start = ChunkPosition {
            segment_id: 7,
            block_number: 0,
            chunk_offset: 0,
            chunk_size: 0,
        };
        let mut reader = wal.new_reader_with_start(&start).unwrap();
        assert!(reader.next().unwrap().is_none());
    }

    #[test]
    fn test_open_new_active_segment() {
        let dir = TempDir::new().unwrap();
        let wal = Wal::open(test_options(&dir)).unwrap();

        let pos1 = wal.write(b"in-segment-1").unwrap();
        wal.open_new_active_segment().unwrap();
        assert_eq!(wal.active_segment_id(), 2);

        let pos2 = wal.write(b"in-segment-2").unwrap();
        assert_eq!(pos2.segment_id, 2);
        assert_eq!(pos2.block_number, 0);
        assert_eq!(pos2.chunk_offset, 0);

        assert_eq!(&wal.read(&pos1).unwrap()[..], b"in-segment-1");
        assert_eq!(&wal.read(&pos2).unwrap()[..], b"in-segment-2");
    }

    #[test]
    fn test_delete_removes_all_segments() {
        let dir = TempDir::new().unwrap();
        let options = Options::new(dir.path())
            .with_segment_size(64 * 1024)
            .with_block_cache(0);
        let wal = Wal::open(options.clone()).unwrap();

        let data = vec![b'd'; 8 * 1024];
        for _ in 0..32 {
            wal.write(&data).unwrap();
        }
        wal.delete().unwrap();

        let leftover: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| {
                let name = e.unwrap().file_name();
                parse_segment_file_name(name.to_str()?, ".SEG")
            })
            .collect();
        assert!(leftover.is_empty());

        let wal = Wal::open(options).unwrap();
        assert!(wal.is_empty());
    }

    #[test]
    fn test_rename_file_ext_requires_closed() {
        let dir = TempDir::new().unwrap();
        let wal = Wal::open(test_options(&dir)).unwrap();
        wal.write(b"data").unwrap();

        assert!(matches!(
            wal.rename_file_ext(".VLOG"),
            Err(Error::InvalidOption(_))
        ));
        assert!(matches!(
            wal.rename_file_ext("VLOG"),
            Err(Error::InvalidOption(_))
        ));

        wal.close().unwrap();
        wal.rename_file_ext(".VLOG").unwrap();
        assert!(dir.path().join("000000001.VLOG").exists());
        assert!(!dir.path().join("000000001.SEG").exists());
    }

    #[test]
    fn test_sync_watermark_resets() {
        let dir = TempDir::new().unwrap();
        let options = Options::new(dir.path())
            .with_segment_size(crate::MB)
            .with_block_cache(0)
            .with_bytes_per_sync(16 * 1024);
        let wal = Wal::open(options).unwrap();

        // Writes beyond the watermark trigger syncs without erroring; the
        // records stay readable throughout.
        let data = vec![b's'; 6 * 1024];
        for _ in 0..16 {
            let pos = wal.write(&data).unwrap();
            assert_eq!(&wal.read(&pos).unwrap()[..], &data[..]);
        }
    }

    #[test]
    fn test_max_framed_size_bound() {
        // The bound dominates the exact framed size for any payload split.
        for len in [0u64, 1, 100, 32 * 1024 - 7, 32 * 1024, 100 * 1024] {
            let plan = plan_write(0, 0, len as u32);
            assert!(max_framed_size(len) >= plan.chunk_size as u64);
        }
    }
}
