//! Typed fixed-size pool
//!
//! Same block and free-list discipline as [`FixedSizePool`](super::FixedSizePool),
//! but the item type is a type parameter, so the item size is known at
//! compile time and items are stored as values instead of raw bytes.

use super::fixed::BLOCK_OVERHEAD;
use super::slot::SlotId;
use super::stats::PoolStats;
use crate::error::{Error, Result};
use std::mem;
use tracing::debug;

#[derive(Debug)]
enum Entry<T> {
    Live(T),
    /// Next slot on the free list
    Free(Option<SlotId>),
}

/// Pool of `T` values carved from blocks of `items_per_block` entries
#[derive(Debug)]
pub struct TypedPool<T> {
    items_per_block: usize,
    blocks: Vec<Vec<Entry<T>>>,
    free_head: Option<SlotId>,
    entries: usize,
}

impl<T> TypedPool<T> {
    /// Bytes of one item
    pub const ITEM_SIZE: usize = mem::size_of::<T>();

    /// Create a pool; the first block is reserved immediately
    pub fn new(items_per_block: usize) -> Result<Self> {
        if items_per_block == 0 || items_per_block > u32::MAX as usize {
            return Err(Error::InvalidArgument(format!(
                "items per block must be in 1..={}, got {}",
                u32::MAX,
                items_per_block
            )));
        }
        Ok(Self {
            items_per_block,
            blocks: vec![Vec::with_capacity(items_per_block)],
            free_head: None,
            entries: 0,
        })
    }

    /// Store `value`, reusing the most recently freed slot if any
    pub fn allocate(&mut self, value: T) -> SlotId {
        self.entries += 1;

        if let Some(slot) = self.free_head {
            let entry = &mut self.blocks[slot.block as usize][slot.index as usize];
            if let Entry::Free(next) = *entry {
                self.free_head = next;
            }
            *entry = Entry::Live(value);
            return slot;
        }

        if self
            .blocks
            .last()
            .map_or(true, |block| block.len() == self.items_per_block)
        {
            assert!(
                self.blocks.len() < u32::MAX as usize,
                "typed pool exhausted its block index space"
            );
            self.blocks.push(Vec::with_capacity(self.items_per_block));
            debug!(
                item_size = Self::ITEM_SIZE,
                blocks = self.blocks.len(),
                "Appended typed pool block"
            );
        }

        let block_idx = self.blocks.len() - 1;
        let block = &mut self.blocks[block_idx];
        block.push(Entry::Live(value));
        SlotId::new(block_idx as u32, (block.len() - 1) as u32)
    }

    /// Remove the value in `slot` and put the slot on the free list
    pub fn free(&mut self, slot: SlotId) -> Result<T> {
        let entry = self
            .blocks
            .get_mut(slot.block as usize)
            .and_then(|block| block.get_mut(slot.index as usize))
            .filter(|entry| matches!(entry, Entry::Live(_)))
            .ok_or_else(|| Error::InvalidSlot(format!("{} is not live in this pool", slot)))?;

        let value = match mem::replace(entry, Entry::Free(self.free_head)) {
            Entry::Live(value) => value,
            Entry::Free(_) => unreachable!("entry was checked to be live"),
        };
        self.free_head = Some(slot);
        self.entries -= 1;
        Ok(value)
    }

    pub fn get(&self, slot: SlotId) -> Option<&T> {
        match self.blocks.get(slot.block as usize)?.get(slot.index as usize)? {
            Entry::Live(value) => Some(value),
            Entry::Free(_) => None,
        }
    }

    pub fn get_mut(&mut self, slot: SlotId) -> Option<&mut T> {
        match self
            .blocks
            .get_mut(slot.block as usize)?
            .get_mut(slot.index as usize)?
        {
            Entry::Live(value) => Some(value),
            Entry::Free(_) => None,
        }
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn used(&self) -> usize {
        self.blocks.len()
            * (mem::size_of::<Entry<T>>() * self.items_per_block + BLOCK_OVERHEAD)
    }

    pub fn wasted(&self) -> usize {
        self.used() - self.entries * Self::ITEM_SIZE
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            item_size: Self::ITEM_SIZE,
            slot_size: mem::size_of::<Entry<T>>(),
            items_per_block: self.items_per_block,
            entries: self.entries,
            blocks: self.blocks.len(),
            used: self.used(),
            wasted: self.wasted(),
        }
    }
}
