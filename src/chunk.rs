//! Chunk framing and position encoding.
//!
//! A segment file is a sequence of 32KB blocks, each holding a run of chunks.
//! Every chunk carries a 7-byte header:
//!
//! ```text
//! +---------+---------+------+-----------+
//! | CRC32   | Length  | Type | Payload   |
//! | 4 bytes | 2 bytes | 1 B  | Length B  |
//! +---------+---------+------+-----------+
//! ```
//!
//! The checksum covers `length || type || payload`. Records that do not fit
//! into the remaining block space are fragmented into FIRST/MIDDLE/LAST
//! chunks; records that fit are written as a single FULL chunk.

use bytes::{BufMut, BytesMut};
use crc32fast::Hasher;

use crate::error::{Error, Result};
use crate::segment::SegmentId;
use crate::CHUNK_HEADER_SIZE;

/// Size of an encoded [`ChunkPosition`]: 4 + 4 + 8 + 4 bytes.
pub const CHUNK_POSITION_SIZE: usize = 20;

/// Compute the CRC32 (IEEE) checksum of the given data.
pub(crate) fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Chunk types used by the block framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkType {
    /// Complete record in a single chunk.
    Full = 0,
    /// First chunk of a fragmented record.
    First = 1,
    /// Middle chunk(s) of a fragmented record.
    Middle = 2,
    /// Last chunk of a fragmented record.
    Last = 3,
}

impl ChunkType {
    /// Create from the on-disk byte value.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(ChunkType::Full),
            1 => Some(ChunkType::First),
            2 => Some(ChunkType::Middle),
            3 => Some(ChunkType::Last),
            _ => None,
        }
    }

    /// Convert to the on-disk byte value.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Position of a record inside the log.
///
/// Returned by every write and consumed by positional reads. `chunk_size` is
/// the on-disk span of the record: payload length plus one header per chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkPosition {
    /// Segment file holding the first chunk of the record.
    pub segment_id: SegmentId,
    /// Block number of the first chunk within the segment.
    pub block_number: u32,
    /// Byte offset of the first chunk within its block.
    pub chunk_offset: i64,
    /// Total framed size of the record in bytes.
    pub chunk_size: u32,
}

impl ChunkPosition {
    /// Encode into the fixed 20-byte little-endian wire form:
    /// `segment_id | block_number | chunk_offset | chunk_size`.
    pub fn encode(&self) -> [u8; CHUNK_POSITION_SIZE] {
        let mut buf = [0u8; CHUNK_POSITION_SIZE];
        buf[0..4].copy_from_slice(&self.segment_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.block_number.to_le_bytes());
        buf[8..16].copy_from_slice(&self.chunk_offset.to_le_bytes());
        buf[16..20].copy_from_slice(&self.chunk_size.to_le_bytes());
        buf
    }

    /// Decode from the 20-byte wire form.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < CHUNK_POSITION_SIZE {
            return Err(Error::corruption("chunk position too short"));
        }

        Ok(Self {
            segment_id: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            block_number: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            chunk_offset: i64::from_le_bytes(buf[8..16].try_into().unwrap()),
            chunk_size: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
        })
    }
}

/// Append one framed chunk (header + payload) to `buf`.
pub(crate) fn encode_chunk(buf: &mut BytesMut, payload: &[u8], chunk_type: ChunkType) {
    debug_assert!(payload.len() <= u16::MAX as usize);

    let start = buf.len();
    // CRC placeholder, filled below once length, type and payload are in place.
    buf.put_u32_le(0);
    buf.put_u16_le(payload.len() as u16);
    buf.put_u8(chunk_type.to_byte());
    buf.put_slice(payload);

    let sum = crc32(&buf[start + 4..]);
    buf[start..start + 4].copy_from_slice(&sum.to_le_bytes());
}

/// Decode the chunk at `offset` within a block buffer.
///
/// Verifies the checksum and returns the chunk type, a borrow of the payload,
/// and the offset just past the chunk.
pub(crate) fn decode_chunk(block: &[u8], offset: usize) -> Result<(ChunkType, &[u8], usize)> {
    if offset + CHUNK_HEADER_SIZE > block.len() {
        return Err(Error::corruption("chunk header extends past end of block"));
    }

    let header = &block[offset..offset + CHUNK_HEADER_SIZE];
    let saved_sum = u32::from_le_bytes(header[0..4].try_into().unwrap());
    let length = u16::from_le_bytes(header[4..6].try_into().unwrap()) as usize;

    let payload_start = offset + CHUNK_HEADER_SIZE;
    let payload_end = payload_start + length;
    if payload_end > block.len() {
        return Err(Error::corruption("chunk payload extends past end of block"));
    }

    // The checksum covers length, type and payload.
    let sum = crc32(&block[offset + 4..payload_end]);
    if sum != saved_sum {
        return Err(Error::corruption("invalid crc, the data may be corrupted"));
    }

    let chunk_type = ChunkType::from_byte(header[6])
        .ok_or_else(|| Error::corruption("invalid chunk type"))?;

    Ok((chunk_type, &block[payload_start..payload_end], payload_end))
}
