//! Caching infrastructure for the log.
//!
//! - **LRU Cache**: Bounded LRU with packed primitive keys
//! - **Block Cache**: Caches immutable 32KB segment blocks

mod block_cache;
mod lru;

pub(crate) use block_cache::BlockCache;
