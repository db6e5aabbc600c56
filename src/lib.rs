//! # blockwal
//!
//! An embedded, append-only write-ahead log with segmented, block-based
//! storage.
//!
//! ## Features
//!
//! - **Block-Based Framing**: Records are framed into 32KB blocks with CRC32
//!   checksums; large records are fragmented across blocks
//! - **Segmented Log**: The log is split into size-bounded segment files that
//!   roll over automatically
//! - **Positional Reads**: Every write returns a [`ChunkPosition`] handle that
//!   reads the record back exactly
//! - **Sequential Iteration**: Ordered multi-segment readers replay the log in
//!   write order
//! - **Block Cache**: An LRU cache over immutable 32KB blocks speeds up reads
//! - **Durability**: Configurable fsync cadence (every write, or every N bytes)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use blockwal::{Options, Wal};
//!
//! let wal = Wal::open(Options::new("./wal_data"))?;
//!
//! // Write returns a position handle
//! let pos = wal.write(b"hello world")?;
//!
//! // Read it back
//! let payload = wal.read(&pos)?;
//! assert_eq!(&payload[..], b"hello world");
//!
//! // Replay everything in write order
//! let mut reader = wal.new_reader();
//! while let Some((payload, pos)) = reader.next()? {
//!     // ...
//! }
//! ```
//!
//! Records are opaque byte payloads; the log does not interpret them. A single
//! process owns a log directory at a time.

// Public modules
pub mod error;
pub mod options;

// Internal modules
mod buffer;
mod cache;
mod chunk;
mod segment;
mod wal;

// Re-export main types for convenience
pub use chunk::{ChunkPosition, ChunkType, CHUNK_POSITION_SIZE};
pub use error::{Error, Result};
pub use options::Options;
pub use segment::SegmentId;
pub use wal::{Reader, Wal};

/// One kilobyte.
pub const KB: u64 = 1024;

/// One megabyte.
pub const MB: u64 = 1024 * KB;

/// One gigabyte.
pub const GB: u64 = 1024 * MB;

/// Block size used to frame segment files (32KB).
pub const BLOCK_SIZE: usize = 32 * 1024;

/// Chunk header size: CRC (4) + Length (2) + Type (1) = 7 bytes.
pub const CHUNK_HEADER_SIZE: usize = 7;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(BLOCK_SIZE, 32768);
        assert_eq!(CHUNK_HEADER_SIZE, 7);
        assert_eq!(MB, 1024 * 1024);
        assert_eq!(GB, 1024 * 1024 * 1024);
    }
}
