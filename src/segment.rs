//! Segment file implementation.
//!
//! A segment is one append-only file of the log. Data is framed into 32KB
//! blocks, each holding a run of chunks (see [`crate::chunk`]). The segment
//! owns the block/offset counters for the write path, performs the padding
//! and fragmentation rules, and serves positional reads that may reassemble a
//! record from several blocks, consulting the shared block cache for
//! immutable blocks.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use crate::buffer;
use crate::cache::BlockCache;
use crate::chunk::{decode_chunk, encode_chunk, ChunkPosition, ChunkType};
use crate::error::{Error, Result};
use crate::{BLOCK_SIZE, CHUNK_HEADER_SIZE};

/// Segment identifier. Ids start at 1 and increase monotonically; the segment
/// with the greatest id is the active one.
pub type SegmentId = u32;

/// Build the path of a segment file: `<dir>/<id padded to 9 digits><ext>`.
pub(crate) fn segment_file_path(dir: &Path, ext: &str, id: SegmentId) -> PathBuf {
    dir.join(format!("{:09}{}", id, ext))
}

/// Parse a segment id out of a directory entry name. Entries that do not
/// match `<digits><ext>` are ignored by the caller.
pub(crate) fn parse_segment_file_name(name: &str, ext: &str) -> Option<SegmentId> {
    let stem = name.strip_suffix(ext)?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Counters owned by the write path.
struct SegmentState {
    /// Block currently being appended to.
    block_number: u32,
    /// Bytes already written into that block, always < `BLOCK_SIZE`.
    block_size: u32,
    closed: bool,
}

/// The outcome of planning one record write against a segment's counters.
///
/// [`plan_write`] is pure: `Segment::write` executes a plan, and the WAL's
/// batched-write simulation replays plans to compute positions before any
/// byte is appended. Keeping both on the same function means they cannot
/// diverge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WritePlan {
    /// Zero bytes appended before the record to close out a block tail that
    /// cannot hold another chunk header.
    pub padding: u32,
    /// Block the record starts in, after padding.
    pub start_block: u32,
    /// Offset of the record's first chunk within its block.
    pub start_offset: u32,
    /// Framed size of the record: payload plus one header per chunk.
    pub chunk_size: u32,
    /// Counter values once the record is written.
    pub end_block: u32,
    pub end_offset: u32,
}

/// Plan a record write starting from the given counters.
pub(crate) fn plan_write(block_number: u32, block_size: u32, data_len: u32) -> WritePlan {
    let block = BLOCK_SIZE as u32;
    let header = CHUNK_HEADER_SIZE as u32;

    let mut block_number = block_number;
    let mut block_size = block_size;

    // The remaining block space cannot hold a chunk header: pad and advance.
    let mut padding = 0;
    if block_size + header >= block {
        padding = block - block_size;
        block_number += 1;
        block_size = 0;
    }

    let start_block = block_number;
    let start_offset = block_size;

    let mut chunk_count = 0u32;
    if block_size + data_len + header <= block {
        // The record fits into the current block as a single FULL chunk.
        chunk_count = 1;
        block_size += data_len + header;
        if block_size == block {
            block_number += 1;
            block_size = 0;
        }
    } else {
        // FIRST/MIDDLE/LAST split: each chunk fills the block tail.
        let mut left = data_len;
        while left > 0 {
            let take = (block - block_size - header).min(left);
            chunk_count += 1;
            block_size += take + header;
            if block_size == block {
                block_number += 1;
                block_size = 0;
            }
            left -= take;
        }
    }

    WritePlan {
        padding,
        start_block,
        start_offset,
        chunk_size: data_len + chunk_count * header,
        end_block: block_number,
        end_offset: block_size,
    }
}

/// Result of reassembling one record starting at a chunk position.
pub(crate) struct ReadResult {
    /// The record payload.
    pub value: Bytes,
    /// Framed bytes consumed by the record's chunks.
    pub chunk_size: u32,
    /// Cursor just past the record, with the block-tail jump applied.
    pub next_block_number: u32,
    pub next_chunk_offset: i64,
}

/// One append-only segment file.
pub(crate) struct Segment {
    id: SegmentId,
    path: PathBuf,
    file: File,
    cache: Option<Arc<BlockCache>>,
    state: Mutex<SegmentState>,
}

impl Segment {
    /// Open (or create) the segment file for the given id. The block counters
    /// are derived from the current file length.
    pub fn open(
        dir: &Path,
        ext: &str,
        id: SegmentId,
        cache: Option<Arc<BlockCache>>,
    ) -> Result<Self> {
        let path = segment_file_path(dir, ext, id);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let size = file.metadata()?.len();

        Ok(Self {
            id,
            path,
            file,
            cache,
            state: Mutex::new(SegmentState {
                block_number: (size / BLOCK_SIZE as u64) as u32,
                block_size: (size % BLOCK_SIZE as u64) as u32,
                closed: false,
            }),
        })
    }

    /// The segment id.
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Logical size of the segment in bytes.
    pub fn size(&self) -> u64 {
        let state = self.state.lock();
        state.block_number as u64 * BLOCK_SIZE as u64 + state.block_size as u64
    }

    /// Append a record, fragmenting it into chunks as needed.
    ///
    /// Returns the position of the record's first chunk. The caller (the WAL)
    /// serializes writers; the internal lock only keeps the counters coherent
    /// for concurrent readers.
    pub fn write(&self, data: &[u8]) -> Result<ChunkPosition> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::Closed);
        }

        let plan = plan_write(state.block_number, state.block_size, data.len() as u32);

        if plan.padding > 0 {
            // At most one header's worth of zero bytes.
            let zeros = [0u8; CHUNK_HEADER_SIZE];
            self.append(&zeros[..plan.padding as usize])?;
            state.block_number += 1;
            state.block_size = 0;
        }

        let position = ChunkPosition {
            segment_id: self.id,
            block_number: state.block_number,
            chunk_offset: state.block_size as i64,
            chunk_size: plan.chunk_size,
        };

        let block = BLOCK_SIZE as u32;
        let header = CHUNK_HEADER_SIZE as u32;

        let mut scratch = buffer::pool().get();
        let result = (|| {
            if state.block_size + data.len() as u32 + header <= block {
                self.emit_chunk(&mut state, &mut scratch, data, ChunkType::Full)
            } else {
                let mut written = 0usize;
                loop {
                    let take = ((block - state.block_size - header) as usize)
                        .min(data.len() - written);
                    let end = written + take;
                    let chunk_type = if written == 0 {
                        ChunkType::First
                    } else if end == data.len() {
                        ChunkType::Last
                    } else {
                        ChunkType::Middle
                    };

                    self.emit_chunk(&mut state, &mut scratch, &data[written..end], chunk_type)?;

                    written = end;
                    if written == data.len() {
                        return Ok(());
                    }
                }
            }
        })();
        buffer::pool().put(scratch);
        result?;

        debug_assert_eq!(state.block_number, plan.end_block);
        debug_assert_eq!(state.block_size, plan.end_offset);

        Ok(position)
    }

    /// Serialize one chunk into the scratch buffer and append it with a
    /// single write.
    fn emit_chunk(
        &self,
        state: &mut SegmentState,
        scratch: &mut BytesMut,
        payload: &[u8],
        chunk_type: ChunkType,
    ) -> Result<()> {
        scratch.clear();
        encode_chunk(scratch, payload, chunk_type);
        self.append(scratch)?;

        state.block_size += (payload.len() + CHUNK_HEADER_SIZE) as u32;
        assert!(
            state.block_size <= BLOCK_SIZE as u32,
            "chunk must not exceed its block"
        );
        if state.block_size == BLOCK_SIZE as u32 {
            state.block_number += 1;
            state.block_size = 0;
        }
        Ok(())
    }

    fn append(&self, buf: &[u8]) -> Result<()> {
        // The file is opened in append mode; writes land at the end.
        let mut file = &self.file;
        file.write_all(buf)?;
        Ok(())
    }

    /// Read the record starting at the given position.
    pub fn read(&self, block_number: u32, chunk_offset: i64) -> Result<Bytes> {
        Ok(self.read_internal(block_number, chunk_offset)?.value)
    }

    /// Reassemble the record starting at `(block_number, chunk_offset)`,
    /// following FIRST/MIDDLE/LAST continuation chunks across blocks.
    pub(crate) fn read_internal(
        &self,
        block_number: u32,
        chunk_offset: i64,
    ) -> Result<ReadResult> {
        let (closed, current_block, seg_size) = {
            let state = self.state.lock();
            (
                state.closed,
                state.block_number,
                state.block_number as u64 * BLOCK_SIZE as u64 + state.block_size as u64,
            )
        };
        if closed {
            return Err(Error::Closed);
        }

        if chunk_offset < 0
            || block_number as u64 * BLOCK_SIZE as u64 + chunk_offset as u64 >= seg_size
        {
            return Err(Error::corruption("chunk position past end of segment"));
        }

        let mut block_number = block_number;
        let mut chunk_offset = chunk_offset as usize;
        let mut value = BytesMut::new();
        let mut chunk_size = 0u32;

        loop {
            let block_start = block_number as u64 * BLOCK_SIZE as u64;
            if block_start >= seg_size {
                return Err(Error::corruption("record truncated at end of segment"));
            }
            let block_len = (seg_size - block_start).min(BLOCK_SIZE as u64) as usize;

            // Immutable blocks may be served from (and admitted to) the
            // cache. The block currently being appended to never is.
            let immutable = block_number < current_block;
            let cached = if immutable {
                self.cache
                    .as_ref()
                    .and_then(|cache| cache.get(self.id, block_number))
            } else {
                None
            };

            let (chunk_type, end) = match cached {
                Some(block) => consume_chunk(&block, chunk_offset, &mut value)?,
                None => {
                    let mut buf = buffer::pool().get();
                    buf.resize(block_len, 0);
                    let step = (|| {
                        read_exact_at(&self.file, &mut buf, block_start)?;
                        if block_len == BLOCK_SIZE && immutable {
                            if let Some(cache) = &self.cache {
                                cache.insert(
                                    self.id,
                                    block_number,
                                    Bytes::copy_from_slice(&buf),
                                );
                            }
                        }
                        consume_chunk(&buf, chunk_offset, &mut value)
                    })();
                    buffer::pool().put(buf);
                    step?
                }
            };

            chunk_size += (end - chunk_offset) as u32;

            match chunk_type {
                ChunkType::Full | ChunkType::Last => {
                    // Jump over a block tail too small for another header,
                    // mirroring the writer's padding rule.
                    let (next_block_number, next_chunk_offset) =
                        if end + CHUNK_HEADER_SIZE >= BLOCK_SIZE {
                            (block_number + 1, 0)
                        } else {
                            (block_number, end as i64)
                        };

                    return Ok(ReadResult {
                        value: value.freeze(),
                        chunk_size,
                        next_block_number,
                        next_chunk_offset,
                    });
                }
                ChunkType::First | ChunkType::Middle => {
                    block_number += 1;
                    chunk_offset = 0;
                }
            }
        }
    }

    /// A forward reader over this segment, positioned at the first block.
    pub fn reader(self: &Arc<Self>) -> SegmentReader {
        SegmentReader {
            segment: Arc::clone(self),
            block_number: 0,
            chunk_offset: 0,
        }
    }

    /// Fsync the segment file. A no-op on a closed segment.
    pub fn sync(&self) -> Result<()> {
        if self.state.lock().closed {
            return Ok(());
        }
        self.file.sync_all()?;
        Ok(())
    }

    /// Fsync and mark the segment closed. Idempotent.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        self.file.sync_all()?;
        state.closed = true;
        Ok(())
    }

    /// Close the segment and unlink its file.
    pub fn remove(&self) -> Result<()> {
        self.state.lock().closed = true;
        std::fs::remove_file(&self.path)?;
        Ok(())
    }
}

/// Decode the chunk at `offset`, append its payload to `value`, and return
/// the chunk type and end offset.
fn consume_chunk(
    block: &[u8],
    offset: usize,
    value: &mut BytesMut,
) -> Result<(ChunkType, usize)> {
    let (chunk_type, payload, end) = decode_chunk(block, offset)?;
    value.extend_from_slice(payload);
    Ok((chunk_type, end))
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Forward iterator over one segment, yielding `(payload, position)` pairs in
/// file order.
pub(crate) struct SegmentReader {
    segment: Arc<Segment>,
    block_number: u32,
    chunk_offset: i64,
}

impl SegmentReader {
    /// Id of the segment being read.
    pub fn segment_id(&self) -> SegmentId {
        self.segment.id()
    }

    /// The cursor as a `(block_number, chunk_offset)` pair.
    pub fn position(&self) -> (u32, i64) {
        (self.block_number, self.chunk_offset)
    }

    /// Read the next record. Returns `None` once the cursor reaches the
    /// segment's logical size.
    pub fn next(&mut self) -> Result<Option<(Bytes, ChunkPosition)>> {
        let cursor =
            self.block_number as u64 * BLOCK_SIZE as u64 + self.chunk_offset as u64;
        if cursor >= self.segment.size() {
            return Ok(None);
        }

        let result = self
            .segment
            .read_internal(self.block_number, self.chunk_offset)?;

        let position = ChunkPosition {
            segment_id: self.segment.id(),
            block_number: self.block_number,
            chunk_offset: self.chunk_offset,
            chunk_size: result.chunk_size,
        };

        self.block_number = result.next_block_number;
        self.chunk_offset = result.next_chunk_offset;

        Ok(Some((result.value, position)))
    }
}
