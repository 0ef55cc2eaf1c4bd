//! Fixed-size item pool

use super::block::MemoryBlock;
use super::slot::SlotId;
use super::stats::PoolStats;
use crate::error::{Error, Result};
use std::fmt;
use tracing::{debug, warn};

/// Item sizes are rounded up to a multiple of this many bytes
pub const SLOT_ALIGN: usize = 8;

/// Bookkeeping bytes charged per block on top of its payload
pub const BLOCK_OVERHEAD: usize = 8;

/// End of the free list
const NIL: u64 = u64::MAX;
/// Link value of a slot that is handed out
const LIVE: u64 = u64::MAX - 1;
/// Keeps packed slot ids clear of the two sentinels above
const MAX_BLOCKS: usize = u32::MAX as usize - 1;

#[derive(Debug)]
struct PoolBlock {
    memory: MemoryBlock,
    /// One link word per slot: next free slot, `NIL`, or `LIVE`
    links: Box<[u64]>,
}

/// A pool of equally sized items
///
/// Items are carved from a chain of blocks holding `items_per_block` slots
/// each. Freed slots go onto a LIFO free list and are reused before any new
/// space is carved. Blocks are never returned before the pool is dropped.
#[derive(Debug)]
pub struct FixedSizePool {
    item_size: usize,
    slot_size: usize,
    items_per_block: usize,
    blocks: Vec<PoolBlock>,
    /// Packed id of the most recently freed slot
    free_head: u64,
    entries: usize,
}

impl FixedSizePool {
    /// Create a pool for items of `item_size` bytes
    ///
    /// The first block is allocated immediately.
    pub fn new(item_size: usize, items_per_block: usize) -> Result<Self> {
        if item_size == 0 {
            return Err(Error::InvalidArgument(
                "item size must be at least 1 byte".to_string(),
            ));
        }
        if items_per_block == 0 || items_per_block > u32::MAX as usize {
            return Err(Error::InvalidArgument(format!(
                "items per block must be in 1..={}, got {}",
                u32::MAX,
                items_per_block
            )));
        }

        let slot_size = item_size
            .checked_next_multiple_of(SLOT_ALIGN)
            .filter(|slot| slot.checked_mul(items_per_block).is_some())
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "block of {} items of {} bytes overflows",
                    items_per_block, item_size
                ))
            })?;

        let mut pool = Self {
            item_size,
            slot_size,
            items_per_block,
            blocks: Vec::new(),
            free_head: NIL,
            entries: 0,
        };
        pool.grow();
        Ok(pool)
    }

    fn true_block_size(&self) -> usize {
        self.slot_size * self.items_per_block
    }

    fn grow(&mut self) {
        // Running out of block ids means running out of address space.
        assert!(
            self.blocks.len() < MAX_BLOCKS,
            "fixed-size pool exhausted its block index space"
        );
        self.blocks.push(PoolBlock {
            memory: MemoryBlock::new(self.true_block_size()),
            links: vec![NIL; self.items_per_block].into_boxed_slice(),
        });
        debug!(
            item_size = self.item_size,
            blocks = self.blocks.len(),
            "Appended pool block"
        );
    }

    /// Allocate one item
    ///
    /// Reuses the most recently freed slot if there is one, otherwise carves
    /// the next slot of the newest block, appending a block when it is full.
    ///
    /// # Panics
    /// Panics if the pool already owns `u32::MAX - 1` blocks.
    pub fn allocate(&mut self) -> SlotId {
        let slot = if self.free_head != NIL {
            let slot = SlotId::unpack(self.free_head);
            let link = &mut self.blocks[slot.block as usize].links[slot.index as usize];
            self.free_head = *link;
            *link = LIVE;
            slot
        } else {
            self.carve()
        };

        self.entries += 1;
        slot
    }

    fn carve(&mut self) -> SlotId {
        let slot_size = self.slot_size;
        if self
            .blocks
            .last()
            .map_or(true, |block| block.memory.remaining() < slot_size)
        {
            self.grow();
        }

        let block_idx = self.blocks.len() - 1;
        let block = &mut self.blocks[block_idx];
        let offset = match block.memory.carve(slot_size) {
            Some(offset) => offset,
            None => unreachable!("a fresh block holds at least one slot"),
        };
        let index = offset / slot_size;
        block.links[index] = LIVE;

        SlotId::new(block_idx as u32, index as u32)
    }

    /// Return an item to the pool
    ///
    /// The slot becomes the head of the free list. Slots that are out of
    /// range, never carved or already free are rejected; a live slot taken
    /// from another pool cannot be told apart and must not be passed here.
    pub fn free(&mut self, slot: SlotId) -> Result<()> {
        let link = self
            .blocks
            .get_mut(slot.block as usize)
            .and_then(|block| block.links.get_mut(slot.index as usize))
            .filter(|link| **link == LIVE)
            .ok_or_else(|| {
                warn!(%slot, "Rejected free of a slot that is not live");
                Error::InvalidSlot(format!("{} is not live in this pool", slot))
            })?;

        *link = self.free_head;
        self.free_head = slot.pack();
        self.entries -= 1;
        Ok(())
    }

    /// Check whether `slot` is currently handed out by this pool
    pub fn is_live(&self, slot: SlotId) -> bool {
        self.blocks
            .get(slot.block as usize)
            .and_then(|block| block.links.get(slot.index as usize))
            .is_some_and(|&link| link == LIVE)
    }

    fn item_range(&self, slot: SlotId) -> Result<std::ops::Range<usize>> {
        if !self.is_live(slot) {
            return Err(Error::InvalidSlot(format!(
                "{} is not live in this pool",
                slot
            )));
        }
        let start = slot.index as usize * self.slot_size;
        Ok(start..start + self.item_size)
    }

    /// Borrow the `item_size` bytes of a live item
    pub fn get(&self, slot: SlotId) -> Result<&[u8]> {
        let range = self.item_range(slot)?;
        Ok(self.blocks[slot.block as usize].memory.bytes(range))
    }

    /// Mutably borrow the `item_size` bytes of a live item
    pub fn get_mut(&mut self, slot: SlotId) -> Result<&mut [u8]> {
        let range = self.item_range(slot)?;
        Ok(self.blocks[slot.block as usize].memory.bytes_mut(range))
    }

    /// Write an occupancy map, one line per block
    ///
    /// `#` marks a live slot, `-` a free one and `.` a slot not carved yet.
    pub fn map<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        writeln!(out, "pool {}B memory map:", self.item_size)?;
        for (i, block) in self.blocks.iter().enumerate() {
            let carved = block.memory.cursor() / self.slot_size;
            let row: String = block
                .links
                .iter()
                .enumerate()
                .map(|(idx, &link)| match link {
                    _ if idx >= carved => '.',
                    LIVE => '#',
                    _ => '-',
                })
                .collect();
            writeln!(out, "{:>4} {}", i, row)?;
        }
        Ok(())
    }

    /// Snapshot of the pool counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            item_size: self.item_size,
            slot_size: self.slot_size,
            items_per_block: self.items_per_block,
            entries: self.entries,
            blocks: self.blocks.len(),
            used: self.used(),
            wasted: self.wasted(),
        }
    }

    /// Write the statistics line to `sink`
    pub fn stat<W: fmt::Write>(&self, sink: &mut W) -> fmt::Result {
        writeln!(sink, "{}", self.stats())
    }

    /// Bytes held by blocks, overhead included
    pub fn used(&self) -> usize {
        self.blocks.len() * (self.true_block_size() + BLOCK_OVERHEAD)
    }

    /// Held bytes that are not part of a live item
    pub fn wasted(&self) -> usize {
        self.used() - self.entries * self.item_size
    }

    /// Number of live items
    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Carved slots waiting on the free list
    pub fn free_count(&self) -> usize {
        let carved = match self.blocks.last() {
            Some(last) => {
                (self.blocks.len() - 1) * self.items_per_block
                    + last.memory.cursor() / self.slot_size
            }
            None => 0,
        };
        carved - self.entries
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    pub fn items_per_block(&self) -> usize {
        self.items_per_block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_rejects_zero_sizes() {
        assert!(matches!(
            FixedSizePool::new(0, 4),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            FixedSizePool::new(16, 0),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            FixedSizePool::new(usize::MAX - 2, 4),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_pool_block_growth() {
        let mut pool = FixedSizePool::new(16, 4).unwrap();
        assert_eq!(pool.block_count(), 1);

        let first: Vec<SlotId> = (0..4).map(|_| pool.allocate()).collect();
        assert_eq!(pool.block_count(), 1);
        assert_eq!(pool.entries(), 4);
        assert_eq!(first[3], SlotId::new(0, 3));

        // Fifth item needs a new block
        let fifth = pool.allocate();
        assert_eq!(pool.block_count(), 2);
        assert_eq!(fifth, SlotId::new(1, 0));
    }

    #[test]
    fn test_pool_reuse_order() {
        let mut pool = FixedSizePool::new(16, 4).unwrap();
        let first: Vec<SlotId> = (0..4).map(|_| pool.allocate()).collect();
        pool.allocate();

        for &slot in &first {
            pool.free(slot).unwrap();
        }
        assert_eq!(pool.entries(), 1);
        assert_eq!(pool.free_count(), 4);

        // Most recently freed first
        let again: Vec<SlotId> = (0..4).map(|_| pool.allocate()).collect();
        let expected: Vec<SlotId> = first.iter().rev().copied().collect();
        assert_eq!(again, expected);
        assert_eq!(pool.block_count(), 2);
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn test_pool_accounting() {
        let mut pool = FixedSizePool::new(12, 4).unwrap();
        assert_eq!(pool.slot_size(), 16);
        assert_eq!(pool.used(), 16 * 4 + BLOCK_OVERHEAD);
        assert_eq!(pool.wasted(), pool.used());

        let a = pool.allocate();
        pool.allocate();
        assert_eq!(pool.wasted(), pool.used() - 2 * 12);

        pool.free(a).unwrap();
        assert_eq!(pool.wasted(), pool.used() - 12);

        let stats = pool.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.blocks, 1);
        assert_eq!(stats.used, 72);
        assert_eq!(stats.wasted, 60);
    }

    #[test]
    fn test_pool_rejects_bad_free() {
        let mut pool = FixedSizePool::new(8, 2).unwrap();
        let slot = pool.allocate();

        // Never carved
        assert!(matches!(
            pool.free(SlotId::new(0, 1)),
            Err(Error::InvalidSlot(_))
        ));
        // Out of range
        assert!(pool.free(SlotId::new(3, 0)).is_err());
        assert!(pool.free(SlotId::new(0, 9)).is_err());

        pool.free(slot).unwrap();
        // Double free
        assert!(pool.free(slot).is_err());
        assert_eq!(pool.entries(), 0);
        assert!(pool.get(slot).is_err());
    }

    #[test]
    fn test_pool_item_bytes() {
        let mut pool = FixedSizePool::new(5, 3).unwrap();
        let a = pool.allocate();
        let b = pool.allocate();

        pool.get_mut(a).unwrap().copy_from_slice(b"hello");
        pool.get_mut(b).unwrap().copy_from_slice(b"world");

        assert_eq!(pool.get(a).unwrap(), b"hello");
        assert_eq!(pool.get(b).unwrap(), b"world");
        assert_eq!(pool.get(a).unwrap().len(), 5);
    }

    #[test]
    fn test_pool_map() {
        let mut pool = FixedSizePool::new(8, 4).unwrap();
        let a = pool.allocate();
        pool.allocate();
        pool.allocate();
        pool.free(a).unwrap();

        let mut out = String::new();
        pool.map(&mut out).unwrap();
        assert_eq!(out, "pool 8B memory map:\n   0 -##.\n");

        let mut line = String::new();
        pool.stat(&mut line).unwrap();
        assert!(line.starts_with("pool 8B (slot 8B): entries 2 blocks 1"));
    }
}
