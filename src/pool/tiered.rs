//! Tiered storage: one fixed-size pool per size class, direct allocation above

use super::fixed::FixedSizePool;
use super::slot::SlotId;
use super::stats::StorageStats;
use crate::error::{Error, Result};
use slotmap::{new_key_type, SlotMap};
use std::fmt;
use tracing::{debug, info, warn};

/// Largest `max_item_size` accepted; the size-class table is allocated up front
pub const MAX_POOLED_SIZE: usize = 1 << 16;

new_key_type! {
    /// Key of a direct (unpooled) allocation
    pub struct DirectKey;
}

/// Handle to memory obtained from [`TieredStorage`]
///
/// Like an address, it does not remember the size it was allocated with;
/// callers pass the size back on `free`, `get` and `reallocate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handle {
    /// Item in the pool of its size class
    Pooled(SlotId),
    /// Item larger than the biggest size class
    Direct(DirectKey),
}

/// Variable-size allocator built from fixed-size pools
///
/// Requests of `1..=max_item_size` bytes are served by the pool for exactly
/// that size; the pool is created the first time its size is requested.
/// Larger requests bypass pooling and are counted separately.
pub struct TieredStorage {
    max_item_size: usize,
    items_per_block: usize,
    /// Indexed by item size; entry 0 is never used
    pools: Vec<Option<Box<FixedSizePool>>>,
    direct: SlotMap<DirectKey, Box<[u8]>>,
    direct_bytes: usize,
    direct_calls: u64,
}

impl TieredStorage {
    /// Create storage pooling items of up to `max_item_size` bytes
    ///
    /// # Arguments
    /// * `max_item_size` - Largest pooled size, at most [`MAX_POOLED_SIZE`]; 0 disables pooling
    /// * `items_per_block` - Items per block in every pool
    pub fn new(max_item_size: usize, items_per_block: usize) -> Result<Self> {
        if items_per_block == 0 || items_per_block > u32::MAX as usize {
            return Err(Error::InvalidArgument(format!(
                "items per block must be in 1..={}, got {}",
                u32::MAX,
                items_per_block
            )));
        }
        if max_item_size > MAX_POOLED_SIZE {
            return Err(Error::InvalidArgument(format!(
                "max item size must be at most {}, got {}",
                MAX_POOLED_SIZE, max_item_size
            )));
        }
        let class_count = max_item_size + 1;

        info!(
            max_item_size,
            items_per_block, "Initializing tiered storage"
        );

        let mut pools = Vec::with_capacity(class_count);
        pools.resize_with(class_count, || None);

        Ok(Self {
            max_item_size,
            items_per_block,
            pools,
            direct: SlotMap::with_key(),
            direct_bytes: 0,
            direct_calls: 0,
        })
    }

    fn is_pooled(&self, size: usize) -> bool {
        size > 0 && size <= self.max_item_size
    }

    /// Allocate `size` bytes
    pub fn allocate(&mut self, size: usize) -> Result<Handle> {
        if size == 0 {
            warn!("Rejected zero-byte allocation");
            return Err(Error::InvalidArgument(
                "cannot allocate 0 bytes".to_string(),
            ));
        }

        if self.is_pooled(size) {
            let pool = match self.pools[size].take() {
                Some(pool) => pool,
                None => {
                    debug!(size, "Creating pool for size class");
                    Box::new(FixedSizePool::new(size, self.items_per_block)?)
                }
            };
            let pool = self.pools[size].insert(pool);
            return Ok(Handle::Pooled(pool.allocate()));
        }

        let key = self.direct.insert(vec![0u8; size].into_boxed_slice());
        self.direct_bytes += size;
        self.direct_calls += 1;
        debug!(size, "Direct allocation");
        Ok(Handle::Direct(key))
    }

    /// Move an item to a block of `new_size` bytes
    ///
    /// The first `min(old_size, new_size)` bytes are copied and the old
    /// item is released. The returned handle always refers to a new item.
    pub fn reallocate(&mut self, old: Handle, old_size: usize, new_size: usize) -> Result<Handle> {
        let data = self.get(old, old_size)?;
        let keep = old_size.min(new_size).min(data.len());
        let data = data[..keep].to_vec();

        let new = self.allocate(new_size)?;
        self.get_mut(new, new_size)?[..keep].copy_from_slice(&data);
        self.free(old, old_size)?;
        Ok(new)
    }

    /// Release an item
    ///
    /// `size` must be the size the item was allocated with. Direct items may
    /// also be released with a size of 0.
    pub fn free(&mut self, handle: Handle, size: usize) -> Result<()> {
        match handle {
            Handle::Pooled(slot) if self.is_pooled(size) => match self.pools[size].as_deref_mut() {
                Some(pool) => pool.free(slot),
                None => Err(Error::SizeMismatch(format!(
                    "no item of {} bytes was ever allocated",
                    size
                ))),
            },
            Handle::Direct(key) if !self.is_pooled(size) => {
                let len = self.direct_len(key, size)?;
                self.direct.remove(key);
                self.direct_bytes -= len;
                Ok(())
            }
            _ => Err(Self::mismatch(handle, size)),
        }
    }

    fn mismatch(handle: Handle, size: usize) -> Error {
        warn!(?handle, size, "Handle used with a size of the wrong tier");
        Error::SizeMismatch(format!("{:?} was not allocated with {} bytes", handle, size))
    }

    /// Length of a live direct item, checked against the caller's size
    fn direct_len(&self, key: DirectKey, size: usize) -> Result<usize> {
        let len = self
            .direct
            .get(key)
            .map(|buf| buf.len())
            .ok_or_else(|| Error::InvalidSlot("direct allocation is not live".to_string()))?;
        if size != 0 && size != len {
            return Err(Error::SizeMismatch(format!(
                "direct allocation has {} bytes, not {}",
                len, size
            )));
        }
        Ok(len)
    }

    /// Borrow the bytes of a live item
    pub fn get(&self, handle: Handle, size: usize) -> Result<&[u8]> {
        match handle {
            Handle::Pooled(slot) if self.is_pooled(size) => match self.pools[size].as_deref() {
                Some(pool) => pool.get(slot),
                None => Err(Self::mismatch(handle, size)),
            },
            Handle::Direct(key) if !self.is_pooled(size) => {
                self.direct_len(key, size)?;
                Ok(&self.direct[key][..])
            }
            _ => Err(Self::mismatch(handle, size)),
        }
    }

    /// Mutably borrow the bytes of a live item
    pub fn get_mut(&mut self, handle: Handle, size: usize) -> Result<&mut [u8]> {
        match handle {
            Handle::Pooled(slot) if self.is_pooled(size) => match self.pools[size].as_deref_mut() {
                Some(pool) => pool.get_mut(slot),
                None => Err(Self::mismatch(handle, size)),
            },
            Handle::Direct(key) if !self.is_pooled(size) => {
                self.direct_len(key, size)?;
                Ok(&mut self.direct[key][..])
            }
            _ => Err(Self::mismatch(handle, size)),
        }
    }

    /// Pool serving `size`, if it has been created
    pub fn pool(&self, size: usize) -> Option<&FixedSizePool> {
        self.pools.get(size)?.as_deref()
    }

    pub fn max_item_size(&self) -> usize {
        self.max_item_size
    }

    pub fn items_per_block(&self) -> usize {
        self.items_per_block
    }

    /// Bytes currently held by direct allocations
    pub fn direct_bytes(&self) -> usize {
        self.direct_bytes
    }

    /// Direct allocations made since creation
    pub fn direct_calls(&self) -> u64 {
        self.direct_calls
    }

    /// Get statistics about every size class and the bypass counters
    pub fn stats(&self) -> StorageStats {
        let mut stats = StorageStats {
            max_item_size: self.max_item_size,
            items_per_block: self.items_per_block,
            direct_bytes: self.direct_bytes,
            direct_live: self.direct.len(),
            direct_calls: self.direct_calls,
            ..Default::default()
        };

        for pool in self.pools.iter().flatten() {
            let class = pool.stats();
            stats.pooled_used += class.used;
            stats.pooled_wasted += class.wasted;
            stats.size_classes.push(class);
        }

        stats
    }

    /// Write the statistics report to `sink`
    pub fn stat<W: fmt::Write>(&self, sink: &mut W) -> fmt::Result {
        writeln!(sink, "{}", self.stats())
    }
}

impl fmt::Debug for TieredStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TieredStorage")
            .field("max_item_size", &self.max_item_size)
            .field("items_per_block", &self.items_per_block)
            .field("direct_live", &self.direct.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_pooled_reuse() -> Result<()> {
        let mut storage = TieredStorage::new(8, 4)?;

        let a = storage.allocate(5)?;
        assert!(matches!(a, Handle::Pooled(_)));
        storage.free(a, 5)?;

        // Same size class hands the freed slot back
        let b = storage.allocate(5)?;
        assert_eq!(a, b);
        assert_eq!(storage.pool(5).map(|p| p.entries()), Some(1));
        Ok(())
    }

    #[test]
    fn test_storage_bypass() -> Result<()> {
        let mut storage = TieredStorage::new(8, 4)?;
        storage.allocate(3)?;

        let big = storage.allocate(100)?;
        assert!(matches!(big, Handle::Direct(_)));
        assert_eq!(storage.direct_calls(), 1);
        assert_eq!(storage.direct_bytes(), 100);
        assert_eq!(storage.pool(3).map(|p| p.entries()), Some(1));
        assert_eq!(storage.stats().size_classes.len(), 1);

        assert_eq!(storage.get(big, 100)?.len(), 100);
        storage.free(big, 0)?;
        assert_eq!(storage.direct_bytes(), 0);
        assert_eq!(storage.direct_calls(), 1);

        // Already released
        assert!(matches!(storage.free(big, 0), Err(Error::InvalidSlot(_))));
        Ok(())
    }

    #[test]
    fn test_storage_rejects_huge_max_item_size() {
        for max in [MAX_POOLED_SIZE + 1, u32::MAX as usize, usize::MAX - 1, usize::MAX] {
            assert!(matches!(
                TieredStorage::new(max, 4),
                Err(Error::InvalidArgument(_))
            ));
        }
        let storage = TieredStorage::new(MAX_POOLED_SIZE, 4).unwrap();
        assert_eq!(storage.max_item_size(), MAX_POOLED_SIZE);
    }

    #[test]
    fn test_storage_size_checks() -> Result<()> {
        let mut storage = TieredStorage::new(8, 4)?;
        assert!(matches!(
            storage.allocate(0),
            Err(Error::InvalidArgument(_))
        ));

        let small = storage.allocate(4)?;
        let big = storage.allocate(9)?;

        assert!(matches!(storage.free(small, 9), Err(Error::SizeMismatch(_))));
        assert!(matches!(storage.free(big, 4), Err(Error::SizeMismatch(_))));
        assert!(matches!(storage.free(big, 12), Err(Error::SizeMismatch(_))));
        // Pool for 6 bytes does not exist
        assert!(matches!(storage.free(small, 6), Err(Error::SizeMismatch(_))));

        storage.free(small, 4)?;
        storage.free(big, 9)?;
        Ok(())
    }

    #[test]
    fn test_storage_reallocate() -> Result<()> {
        let mut storage = TieredStorage::new(8, 4)?;

        let small = storage.allocate(4)?;
        storage.get_mut(small, 4)?.copy_from_slice(b"abcd");

        // Grow past the pooled range
        let big = storage.reallocate(small, 4, 20)?;
        assert!(matches!(big, Handle::Direct(_)));
        assert_eq!(&storage.get(big, 20)?[..4], b"abcd");
        assert_eq!(&storage.get(big, 20)?[4..], &[0u8; 16]);
        assert_eq!(storage.pool(4).map(|p| p.entries()), Some(0));

        // Shrink back into a pool
        let tiny = storage.reallocate(big, 20, 2)?;
        assert_eq!(storage.get(tiny, 2)?, b"ab");
        assert_eq!(storage.direct_bytes(), 0);
        Ok(())
    }

    #[test]
    fn test_storage_stats() -> Result<()> {
        let mut storage = TieredStorage::new(16, 8)?;
        storage.allocate(1)?;
        storage.allocate(1)?;
        storage.allocate(16)?;
        storage.allocate(64)?;

        let stats = storage.stats();
        assert_eq!(stats.size_classes.len(), 2);
        assert_eq!(stats.size_classes[0].item_size, 1);
        assert_eq!(stats.size_classes[0].entries, 2);
        assert_eq!(stats.size_classes[1].item_size, 16);
        assert_eq!(
            stats.pooled_used,
            stats.size_classes.iter().map(|c| c.used).sum::<usize>()
        );
        assert_eq!(stats.direct_live, 1);

        let mut out = String::new();
        storage.stat(&mut out).unwrap();
        assert!(out.starts_with("storage (max item 16B, 8 items/block)"));
        assert!(out.contains("direct: calls 1 live 1 used 64 B"));
        Ok(())
    }

    #[test]
    fn test_storage_without_pools() -> Result<()> {
        let mut storage = TieredStorage::new(0, 4)?;
        let h = storage.allocate(1)?;
        assert!(matches!(h, Handle::Direct(_)));
        storage.free(h, 1)?;
        assert!(TieredStorage::new(4, 0).is_err());
        Ok(())
    }
}
