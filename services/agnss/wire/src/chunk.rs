//! Fixed-size block chunking for flash transfers.
//!
//! Offline data written to receiver flash is sent as raw byte blocks rather
//! than as discrete frames. Blocks are byte ranges into the caller's buffer.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Flash block payload size
pub const FLASH_BLOCK_SIZE: usize = 512;

/// One block of a chunked payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSpan {
    /// 0-based block index
    pub index: usize,
    /// Byte range in the source buffer
    pub range: Range<usize>,
}

impl BlockSpan {
    /// Block length in bytes
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// True for a zero-length block
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Chunker for splitting a payload into blocks
#[derive(Debug, Clone)]
pub struct Chunker {
    block_size: usize,
}

impl Chunker {
    /// Create a new chunker with the flash block size
    pub fn new() -> Self {
        Self {
            block_size: FLASH_BLOCK_SIZE,
        }
    }

    /// Use a different block size; zero is treated as one
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// Number of blocks needed for `len` bytes
    pub fn block_count(&self, len: usize) -> usize {
        (len + self.block_size - 1) / self.block_size
    }

    /// Split `len` bytes into consecutive block ranges; the last may be short
    pub fn split(&self, len: usize) -> impl Iterator<Item = BlockSpan> + '_ {
        (0..self.block_count(len)).map(move |index| {
            let start = index * self.block_size;
            let end = std::cmp::min(start + self.block_size, len);
            BlockSpan {
                index,
                range: start..end,
            }
        })
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new()
    }
}
