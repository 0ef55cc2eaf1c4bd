//! One tiered storage per thread
//!
//! The allocators have no internal locking. Code that runs on several
//! worker threads keeps one storage per thread instead, created lazily the
//! first time the thread asks for it.

use super::stats::StorageStats;
use super::tiered::TieredStorage;
use crate::config::StorageConfig;
use crate::error::{Error, Result};
use std::cell::RefCell;
use tracing::debug;

thread_local! {
    static STORAGE: RefCell<Option<TieredStorage>> = const { RefCell::new(None) };
}

/// Run `f` with this thread's storage, building it from `config` if needed
///
/// Once the storage exists, `config` is ignored on that thread. Calling this
/// again from inside `f` fails instead of aliasing the storage.
pub fn with_thread_storage<R>(
    config: &StorageConfig,
    f: impl FnOnce(&mut TieredStorage) -> R,
) -> Result<R> {
    STORAGE.with(|cell| {
        let mut slot = cell.try_borrow_mut().map_err(|_| {
            Error::InvalidArgument("thread storage is already in use".to_string())
        })?;
        let storage = match slot.take() {
            Some(storage) => storage,
            None => {
                debug!(thread = ?std::thread::current().id(), "Creating thread storage");
                config.build()?
            }
        };
        Ok(f(slot.insert(storage)))
    })
}

/// Drop this thread's storage and return its final statistics
pub fn release_thread_storage() -> Option<StorageStats> {
    STORAGE.with(|cell| cell.borrow_mut().take().map(|storage| storage.stats()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_storage_is_reused() {
        release_thread_storage();
        let config = StorageConfig {
            max_item_size: 8,
            items_per_block: 4,
        };

        let first = with_thread_storage(&config, |s| s.allocate(4)).unwrap().unwrap();
        // A different config no longer matters on this thread
        let other = StorageConfig::default();
        let max = with_thread_storage(&other, |s| s.max_item_size()).unwrap();
        assert_eq!(max, 8);

        with_thread_storage(&config, |s| s.free(first, 4)).unwrap().unwrap();
        let stats = release_thread_storage().unwrap();
        assert_eq!(stats.size_classes[0].entries, 0);
        assert!(release_thread_storage().is_none());
    }

    #[test]
    fn test_thread_storage_per_thread() {
        let config = StorageConfig {
            max_item_size: 16,
            items_per_block: 8,
        };

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let config = config.clone();
                std::thread::spawn(move || {
                    for _ in 0..=i {
                        with_thread_storage(&config, |s| s.allocate(12)).unwrap().unwrap();
                    }
                    release_thread_storage().map(|stats| stats.size_classes[0].entries)
                })
            })
            .collect();

        let counts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(counts, vec![Some(1), Some(2), Some(3), Some(4)]);
    }

    #[test]
    fn test_thread_storage_rejects_reentry() {
        let config = StorageConfig::default();
        let nested = with_thread_storage(&config, |_| {
            with_thread_storage(&config, |s| s.max_item_size()).is_err()
        })
        .unwrap();
        assert!(nested);
        release_thread_storage();
    }
}
