// mempool - Rust Implementation
// Block-based size-class allocators for natural-language-processing records

#![warn(rust_2018_idioms)]

pub mod config;
pub mod pool;
pub mod workload;

// Re-exports for convenience
pub use crate::config::MemConfig;
pub use pool::{
    FixedSizePool, Handle, PoolStats, SlotId, StackStats, StorageStats, StringStack,
    TieredStorage, TypedPool,
};

/// Allocator error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum Error {
        #[error("Invalid argument: {0}")]
        InvalidArgument(String),

        #[error("Invalid slot: {0}")]
        InvalidSlot(String),

        #[error("Size mismatch: {0}")]
        SizeMismatch(String),

        #[error("String stack is empty")]
        EmptyStack,

        #[error("String of {len} bytes does not fit in a {block} byte block")]
        StringTooLong { len: usize, block: usize },

        #[error("Configuration error: {0}")]
        Config(String),
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::error::Error;

    #[test]
    fn test_error_display() {
        let err = Error::StringTooLong { len: 40, block: 32 };
        assert_eq!(
            err.to_string(),
            "String of 40 bytes does not fit in a 32 byte block"
        );
        assert_eq!(Error::EmptyStack.to_string(), "String stack is empty");
    }
}
