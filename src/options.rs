//! Configuration options for blockwal.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::{BLOCK_SIZE, GB};

/// Default segment file extension.
pub const DEFAULT_SEGMENT_FILE_EXT: &str = ".SEG";

/// Default maximum segment size (1GB).
pub const DEFAULT_SEGMENT_SIZE: u64 = GB;

/// Default block cache size (100 blocks).
pub const DEFAULT_BLOCK_CACHE_SIZE: u32 = 100 * BLOCK_SIZE as u32;

/// Configuration options for a write-ahead log.
///
/// ```rust,ignore
/// let options = Options::new("/tmp/wal")
///     .with_segment_size(256 * blockwal::MB)
///     .with_sync(true);
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    /// Directory holding the segment files.
    pub dir_path: PathBuf,

    /// Maximum size of each segment file in bytes. A write is refused if the
    /// framed payload cannot fit into an empty segment; the active segment
    /// rolls over once a write would exceed this size.
    pub segment_size: u64,

    /// Extension of the segment files. Must begin with a dot.
    pub segment_file_ext: String,

    /// Size of the block cache in bytes. Recently read immutable blocks are
    /// kept in memory to serve repeated reads. Zero disables the cache.
    pub block_cache: u32,

    /// Fsync after every write.
    pub sync: bool,

    /// Fsync once this many bytes have accumulated since the last sync.
    /// Zero disables byte-triggered syncs. Ignored when `sync` is set.
    pub bytes_per_sync: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir_path: std::env::temp_dir().join("blockwal"),
            segment_size: DEFAULT_SEGMENT_SIZE,
            segment_file_ext: DEFAULT_SEGMENT_FILE_EXT.to_string(),
            block_cache: DEFAULT_BLOCK_CACHE_SIZE,
            sync: false,
            bytes_per_sync: 0,
        }
    }
}

impl Options {
    /// Create options for the given directory with defaults for everything
    /// else.
    pub fn new(dir_path: impl AsRef<Path>) -> Self {
        Self {
            dir_path: dir_path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Set the maximum segment file size.
    #[must_use]
    pub fn with_segment_size(mut self, size: u64) -> Self {
        self.segment_size = size;
        self
    }

    /// Set the segment file extension. Must begin with a dot.
    #[must_use]
    pub fn with_segment_file_ext(mut self, ext: impl Into<String>) -> Self {
        self.segment_file_ext = ext.into();
        self
    }

    /// Set the block cache size in bytes. Zero disables the cache.
    #[must_use]
    pub fn with_block_cache(mut self, bytes: u32) -> Self {
        self.block_cache = bytes;
        self
    }

    /// Enable or disable fsync after every write.
    #[must_use]
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Fsync once this many bytes have been written since the last sync.
    #[must_use]
    pub fn with_bytes_per_sync(mut self, bytes: u32) -> Self {
        self.bytes_per_sync = bytes;
        self
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if !self.segment_file_ext.starts_with('.') {
            return Err(Error::invalid_option(
                "segment file extension must start with '.'",
            ));
        }

        if self.segment_size == 0 {
            return Err(Error::invalid_option("segment size must be positive"));
        }

        if self.block_cache as u64 > self.segment_size {
            return Err(Error::invalid_option(
                "block cache size must not exceed the segment size",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = Options::default();
        assert_eq!(opts.segment_size, DEFAULT_SEGMENT_SIZE);
        assert_eq!(opts.segment_file_ext, ".SEG");
        assert!(!opts.sync);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_options_fluent() {
        let opts = Options::new("/tmp/wal-test")
            .with_segment_size(64 * 1024 * 1024)
            .with_segment_file_ext(".VLOG")
            .with_sync(true)
            .with_bytes_per_sync(4096);

        assert_eq!(opts.dir_path, PathBuf::from("/tmp/wal-test"));
        assert_eq!(opts.segment_size, 64 * 1024 * 1024);
        assert_eq!(opts.segment_file_ext, ".VLOG");
        assert!(opts.sync);
        assert_eq!(opts.bytes_per_sync, 4096);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_options_validation() {
        let opts = Options::default().with_segment_file_ext("SEG");
        assert!(opts.validate().is_err());

        let opts = Options::default().with_segment_size(0);
        assert!(opts.validate().is_err());

        // Cache larger than the segment is rejected.
        let opts = Options::default()
            .with_segment_size(1024)
            .with_block_cache(BLOCK_SIZE as u32);
        assert!(opts.validate().is_err());

        // Disabled cache is always fine.
        let opts = Options::default()
            .with_segment_size(1024)
            .with_block_cache(0);
        assert!(opts.validate().is_ok());
    }
}
