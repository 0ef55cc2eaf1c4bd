//! Slot handles for fixed-size pools

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one item slot inside a pool
///
/// Plays the role of an item address: it stays valid until the slot is
/// freed, and a pool that hands the slot out again returns an equal id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotId {
    /// Block index (0 = oldest block)
    pub block: u32,
    /// Item index within the block
    pub index: u32,
}

impl SlotId {
    /// Create a new slot ID
    pub fn new(block: u32, index: u32) -> Self {
        Self { block, index }
    }

    /// Pack into a single free-list link word
    pub(crate) fn pack(self) -> u64 {
        (u64::from(self.block) << 32) | u64::from(self.index)
    }

    /// Inverse of [`SlotId::pack`]
    pub(crate) fn unpack(word: u64) -> Self {
        Self {
            block: (word >> 32) as u32,
            index: word as u32,
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot(block={}, index={})", self.block, self.index)
    }
}
