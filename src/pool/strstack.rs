//! LIFO stack of byte strings packed into fixed-size blocks
//!
//! Each string is stored as its bytes followed by a 4-byte little-endian
//! length tag, so the top string can always be located from the block
//! cursor:
//!
//! ```text
//! block 0: | t h e | 03 00 00 00 | c a t | 03 00 00 00 | (waste) |
//! block 1: | p h r a s e | 06 00 00 00 | ...                     ^ cursor
//! ```
//!
//! A string never spans two blocks. When it does not fit, the rest of the
//! current block is counted as waste and the stack moves on to the next
//! block. Blocks emptied by `pop` are kept and reused by later pushes. A
//! block's leftover is charged only the first time the stack leaves it, so
//! waste never exceeds the memory held.

use super::block::MemoryBlock;
use super::stats::StackStats;
use crate::error::{Error, Result};
use std::fmt;
use std::ops::Range;
use tracing::{debug, warn};

/// Bytes of the length tag stored after each string
pub const LEN_TAG: usize = 4;

/// Block size used by [`StringStack::default`]
pub const DEFAULT_BLOCK_BYTES: usize = 1000;

#[derive(Debug)]
pub struct StringStack {
    bytes_per_block: usize,
    blocks: Vec<MemoryBlock>,
    /// Block receiving the next push
    current: usize,
    /// Blocks below this index have had their leftover charged as waste
    charged: usize,
    waste: usize,
    memory: usize,
    entries: usize,
}

impl StringStack {
    /// Create a stack with blocks of `bytes_per_block` bytes
    pub fn new(bytes_per_block: usize) -> Result<Self> {
        if bytes_per_block <= LEN_TAG || bytes_per_block > u32::MAX as usize {
            return Err(Error::InvalidArgument(format!(
                "string block size must be in {}..={}, got {}",
                LEN_TAG + 1,
                u32::MAX,
                bytes_per_block
            )));
        }
        Ok(Self::with_block_bytes(bytes_per_block))
    }

    fn with_block_bytes(bytes_per_block: usize) -> Self {
        Self {
            bytes_per_block,
            blocks: vec![MemoryBlock::new(bytes_per_block)],
            current: 0,
            charged: 0,
            waste: 0,
            memory: bytes_per_block,
            entries: 0,
        }
    }

    /// Copy `bytes` onto the top of the stack and return the stored copy
    pub fn push(&mut self, bytes: &[u8]) -> Result<&[u8]> {
        let len = bytes.len();
        let need = len + LEN_TAG;
        if need > self.bytes_per_block {
            warn!(len, block = self.bytes_per_block, "String too long for stack block");
            return Err(Error::StringTooLong {
                len,
                block: self.bytes_per_block,
            });
        }

        if self.blocks[self.current].remaining() < need {
            if self.current >= self.charged {
                self.waste += self.blocks[self.current].remaining();
                self.charged = self.current + 1;
            }
            self.current += 1;
            if self.current == self.blocks.len() {
                self.blocks.push(MemoryBlock::new(self.bytes_per_block));
                self.memory += self.bytes_per_block;
                debug!(blocks = self.blocks.len(), "Appended string stack block");
            }
        }

        let block = &mut self.blocks[self.current];
        let offset = match block.carve(need) {
            Some(offset) => offset,
            None => unreachable!("an empty block holds any string that passed the size check"),
        };
        block
            .bytes_mut(offset..offset + len)
            .copy_from_slice(bytes);
        block
            .bytes_mut(offset + len..offset + need)
            .copy_from_slice(&(len as u32).to_le_bytes());

        self.entries += 1;
        Ok(block.bytes(offset..offset + len))
    }

    /// Index of the block holding the top string
    fn top_block(&self) -> Result<usize> {
        if self.entries == 0 {
            return Err(Error::EmptyStack);
        }
        (0..=self.current)
            .rev()
            .find(|&i| self.blocks[i].cursor() > 0)
            .ok_or(Error::EmptyStack)
    }

    /// Byte range of the top string inside `block`
    fn top_range(&self, block: usize) -> Range<usize> {
        let block = &self.blocks[block];
        let end = block.cursor();
        let mut tag = [0u8; LEN_TAG];
        tag.copy_from_slice(block.bytes(end - LEN_TAG..end));
        let len = u32::from_le_bytes(tag) as usize;
        let start = end - LEN_TAG - len;
        start..start + len
    }

    /// Remove the most recently pushed string
    ///
    /// The returned bytes stay valid until the next mutation of the stack.
    pub fn pop(&mut self) -> Result<&[u8]> {
        let block_idx = self.top_block()?;
        let range = self.top_range(block_idx);

        self.current = block_idx;
        self.entries -= 1;
        let block = &mut self.blocks[block_idx];
        block.rewind(range.start);
        Ok(block.bytes(range))
    }

    /// Borrow the most recently pushed string without removing it
    pub fn top(&self) -> Result<&[u8]> {
        let block_idx = self.top_block()?;
        let range = self.top_range(block_idx);
        Ok(self.blocks[block_idx].bytes(range))
    }

    pub fn stats(&self) -> StackStats {
        StackStats {
            bytes_per_block: self.bytes_per_block,
            entries: self.entries,
            blocks: self.blocks.len(),
            used: self.memory,
            wasted: self.waste,
        }
    }

    /// Write the statistics line to `sink`
    pub fn stat<W: fmt::Write>(&self, sink: &mut W) -> fmt::Result {
        writeln!(sink, "{}", self.stats())
    }

    /// Bytes obtained for blocks so far
    pub fn used(&self) -> usize {
        self.memory
    }

    /// Bytes left unused at the end of blocks the stack moved past
    pub fn wasted(&self) -> usize {
        self.waste
    }

    /// Number of strings on the stack
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn bytes_per_block(&self) -> usize {
        self.bytes_per_block
    }
}

impl Default for StringStack {
    fn default() -> Self {
        Self::with_block_bytes(DEFAULT_BLOCK_BYTES)
    }
}
