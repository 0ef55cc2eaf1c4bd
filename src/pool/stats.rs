//! Allocator statistics

use serde::Serialize;
use std::fmt;

/// Statistics for a fixed-size pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Requested bytes per item
    pub item_size: usize,
    /// Bytes reserved per item after alignment
    pub slot_size: usize,
    pub items_per_block: usize,
    /// Live items
    pub entries: usize,
    pub blocks: usize,
    /// Bytes held by blocks, including per-block overhead
    pub used: usize,
    /// `used` minus the bytes of live items
    pub wasted: usize,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pool {}B (slot {}B): entries {} blocks {} used {} B wasted {} B",
            self.item_size, self.slot_size, self.entries, self.blocks, self.used, self.wasted
        )
    }
}

/// Statistics for a string stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StackStats {
    pub bytes_per_block: usize,
    /// Strings currently on the stack
    pub entries: usize,
    pub blocks: usize,
    /// Cumulative bytes obtained for blocks
    pub used: usize,
    /// Cumulative bytes abandoned at block ends
    pub wasted: usize,
}

impl fmt::Display for StackStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "string stack ({}B blocks): entries {} blocks {} used {} B wasted {} B",
            self.bytes_per_block, self.entries, self.blocks, self.used, self.wasted
        )
    }
}

/// Statistics for tiered storage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub max_item_size: usize,
    pub items_per_block: usize,
    /// One entry per size class that has been used, smallest first
    pub size_classes: Vec<PoolStats>,
    /// Sum of `used` over all pools
    pub pooled_used: usize,
    /// Sum of `wasted` over all pools
    pub pooled_wasted: usize,
    /// Bytes currently held by direct allocations
    pub direct_bytes: usize,
    /// Direct allocations still live
    pub direct_live: usize,
    /// Direct allocations made since creation
    pub direct_calls: u64,
}

impl fmt::Display for StorageStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "storage (max item {}B, {} items/block)",
            self.max_item_size, self.items_per_block
        )?;
        for class in &self.size_classes {
            writeln!(f, "  {}", class)?;
        }
        writeln!(
            f,
            "  pools: {} used {} B wasted {} B",
            self.size_classes.len(),
            self.pooled_used,
            self.pooled_wasted
        )?;
        write!(
            f,
            "  direct: calls {} live {} used {} B",
            self.direct_calls, self.direct_live, self.direct_bytes
        )
    }
}
