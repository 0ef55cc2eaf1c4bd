//! Memory blocks carved by pools and string stacks

use std::ops::Range;

/// One contiguous buffer obtained from the global allocator
///
/// Space is handed out front to back by moving `cursor`. The buffer is
/// zero-filled on creation and is never resized or partially released.
#[derive(Debug)]
pub struct MemoryBlock {
    data: Box<[u8]>,
    /// Offset of the first byte not yet carved
    cursor: usize,
}

impl MemoryBlock {
    /// Allocate a zeroed block of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            cursor: 0,
        }
    }

    /// Total size of the block in bytes
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Offset of the next uncarved byte
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bytes still available for carving
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// Carve `len` bytes, returning their offset
    ///
    /// Returns `None` when the block cannot hold `len` more bytes.
    pub fn carve(&mut self, len: usize) -> Option<usize> {
        if len > self.remaining() {
            return None;
        }
        let offset = self.cursor;
        self.cursor += len;
        Some(offset)
    }

    /// Move the cursor back to `offset`, making everything after it uncarved
    ///
    /// Offsets past the current cursor are ignored.
    pub fn rewind(&mut self, offset: usize) {
        if offset <= self.cursor {
            self.cursor = offset;
        }
    }

    /// Borrow a carved range
    pub fn bytes(&self, range: Range<usize>) -> &[u8] {
        &self.data[range]
    }

    /// Mutably borrow a carved range
    pub fn bytes_mut(&mut self, range: Range<usize>) -> &mut [u8] {
        &mut self.data[range]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_carving() {
        let mut block = MemoryBlock::new(10);
        assert_eq!(block.capacity(), 10);

        assert_eq!(block.carve(4), Some(0));
        assert_eq!(block.carve(4), Some(4));
        assert_eq!(block.remaining(), 2);

        // Not enough room left
        assert_eq!(block.carve(3), None);
        assert_eq!(block.cursor(), 8);

        assert_eq!(block.carve(2), Some(8));
        assert_eq!(block.remaining(), 0);
    }

    #[test]
    fn test_block_rewind() {
        let mut block = MemoryBlock::new(16);
        block.carve(12);

        block.rewind(4);
        assert_eq!(block.cursor(), 4);

        // Rewinding forward is a no-op
        block.rewind(10);
        assert_eq!(block.cursor(), 4);
    }

    #[test]
    fn test_block_is_zeroed() {
        let mut block = MemoryBlock::new(8);
        assert!(block.bytes(0..8).iter().all(|&b| b == 0));

        block.bytes_mut(2..4).copy_from_slice(b"ok");
        assert_eq!(block.bytes(2..4), b"ok");
    }
}
