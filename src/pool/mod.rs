//! Block Allocators
//!
//! Manages large numbers of small, short-lived records (tokens, phrase
//! entries, strings) by carving them out of big blocks instead of calling
//! the global allocator once per record.
//!
//! # Architecture
//!
//! ```text
//! TieredStorage (max_item_size = 4)
//!   ├─→ [0]  unused
//!   ├─→ [1]  FixedSizePool(1B)   → Free: [b0:3, b0:1]
//!   ├─→ [2]  (created on first use)
//!   ├─→ [3]  FixedSizePool(3B)   → Free: []
//!   ├─→ [4]  FixedSizePool(4B)   → Free: [b1:0]
//!   └─→ > 4  direct allocations (bypass counters)
//!
//! FixedSizePool
//!   └─→ blocks: [MemoryBlock, MemoryBlock, ...]   (carve from the last one)
//!
//! StringStack
//!   └─→ blocks: [MemoryBlock | "the\x03\0\0\0cat\x03\0\0\0", ...]
//! ```
//!
//! Blocks are only released when their owner is dropped. A freed slot is
//! pushed onto its pool's free list and is the first one handed out again.

pub mod block;
pub mod fixed;
pub mod local;
pub mod slot;
pub mod stats;
pub mod strstack;
pub mod tiered;
pub mod typed;

pub use block::MemoryBlock;
pub use fixed::FixedSizePool;
pub use local::with_thread_storage;
pub use slot::SlotId;
pub use stats::{PoolStats, StackStats, StorageStats};
pub use strstack::StringStack;
pub use tiered::{Handle, TieredStorage};
pub use typed::TypedPool;
