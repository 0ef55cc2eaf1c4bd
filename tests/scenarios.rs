//! End-to-end allocator scenarios

use mempool::error::Error;
use mempool::{FixedSizePool, Handle, MemConfig, SlotId, StringStack, TieredStorage, TypedPool};

#[test]
fn test_fixed_pool_four_per_block() {
    let mut pool = FixedSizePool::new(16, 4).expect("valid pool");

    let first: Vec<SlotId> = (0..4).map(|_| pool.allocate()).collect();
    assert_eq!(pool.block_count(), 1);

    pool.allocate();
    assert_eq!(pool.block_count(), 2);
    let used = pool.used();

    for &slot in &first {
        pool.free(slot).unwrap();
    }
    let reused: Vec<SlotId> = (0..4).map(|_| pool.allocate()).collect();

    // Most recently freed first, no new block
    assert_eq!(reused, vec![first[3], first[2], first[1], first[0]]);
    assert_eq!(pool.block_count(), 2);
    assert_eq!(pool.used(), used);
    assert_eq!(pool.entries(), 5);
}

#[test]
fn test_string_stack_small_blocks() {
    let mut stack = StringStack::new(32).expect("valid stack");
    stack.push(b"red").unwrap();
    stack.push(b"cab").unwrap();
    assert_eq!(stack.block_count(), 1);

    assert_eq!(stack.pop().unwrap(), b"cab");
    assert_eq!(stack.pop().unwrap(), b"red");
    assert_eq!(stack.len(), 0);

    assert_eq!(stack.pop(), Err(Error::EmptyStack));
    assert_eq!(stack.top(), Err(Error::EmptyStack));
}

#[test]
fn test_string_stack_waste_counted_once() {
    let mut stack = StringStack::new(32).unwrap();
    stack.push(&[b'x'; 24]).unwrap();
    assert_eq!(stack.wasted(), 0);

    stack.push(&[b'y'; 6]).unwrap();
    assert_eq!(stack.block_count(), 2);
    assert_eq!(stack.wasted(), 4);

    stack.push(&[b'z'; 6]).unwrap();
    assert_eq!(stack.block_count(), 2);
    assert_eq!(stack.wasted(), 4);
}

#[test]
fn test_tiered_storage_reuses_and_bypasses() {
    let mut storage = TieredStorage::new(32, 16).unwrap();

    let token = storage.allocate(7).unwrap();
    storage.free(token, 7).unwrap();
    assert_eq!(storage.allocate(7).unwrap(), token);

    let before = storage.stats().size_classes;
    let phrase = storage.allocate(500).unwrap();
    assert!(matches!(phrase, Handle::Direct(_)));
    assert_eq!(storage.stats().size_classes, before);
    assert_eq!(storage.direct_calls(), 1);
    assert_eq!(storage.direct_bytes(), 500);

    storage.free(phrase, 500).unwrap();
    assert_eq!(storage.direct_bytes(), 0);
}

#[test]
fn test_reallocate_keeps_prefix() {
    let mut storage = TieredStorage::new(16, 4).unwrap();
    let a = storage.allocate(6).unwrap();
    storage.get_mut(a, 6).unwrap().copy_from_slice(b"phrase");

    let b = storage.reallocate(a, 6, 12).unwrap();
    assert_eq!(&storage.get(b, 12).unwrap()[..6], b"phrase");
    assert!(storage.get(a, 6).is_err());

    let c = storage.reallocate(b, 12, 3).unwrap();
    assert_eq!(storage.get(c, 3).unwrap(), b"phr");
}

#[test]
fn test_typed_pool_tokens() {
    #[derive(Debug, PartialEq)]
    struct Entry {
        word: u32,
        count: u32,
    }

    let mut pool = TypedPool::new(128).unwrap();
    let ids: Vec<SlotId> = (0..300)
        .map(|word| pool.allocate(Entry { word, count: 1 }))
        .collect();
    assert_eq!(pool.block_count(), 3);

    pool.get_mut(ids[42]).unwrap().count += 1;
    assert_eq!(pool.free(ids[42]).unwrap(), Entry { word: 42, count: 2 });
    assert_eq!(pool.allocate(Entry { word: 1000, count: 0 }), ids[42]);
}

#[test]
fn test_config_builds_allocators() {
    let config = MemConfig::default();
    let pool = config.pool.build().unwrap();
    let stack = config.strings.build().unwrap();
    let storage = config.storage.build().unwrap();

    assert_eq!(pool.item_size(), 16);
    assert_eq!(stack.bytes_per_block(), 1000);
    assert_eq!(storage.items_per_block(), 256);
}
