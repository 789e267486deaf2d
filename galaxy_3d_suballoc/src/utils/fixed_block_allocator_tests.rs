//! Unit tests for fixed_block_allocator.rs

use crate::error::Error;
use crate::utils::{BlockAllocatorConfig, BlockAllocatorRegistry, FixedBlockAllocator};

fn arena<T>(blocks_per_page: u32) -> FixedBlockAllocator<T> {
    FixedBlockAllocator::new(BlockAllocatorConfig { blocks_per_page })
}

// ============================================================================
// ARENA TESTS
// ============================================================================

#[test]
fn test_two_step_lifecycle() {
    let mut arena = arena::<String>(4);
    let block = arena.allocate();
    assert_eq!(arena.len(), 1);
    assert!(arena.get(block).is_none());

    arena.construct(block, "hello".to_string()).unwrap();
    assert_eq!(arena.get(block).map(String::as_str), Some("hello"));

    assert_eq!(arena.destroy(block), Some("hello".to_string()));
    assert!(arena.get(block).is_none());
    assert_eq!(arena.len(), 1);

    arena.free(block).unwrap();
    assert!(arena.is_empty());
}

#[test]
fn test_construct_twice_fails() {
    let mut arena = arena::<u32>(4);
    let block = arena.allocate();
    arena.construct(block, 1).unwrap();
    assert!(matches!(arena.construct(block, 2), Err(Error::InvalidParameter(_))));
    assert_eq!(arena.get(block), Some(&1));
}

#[test]
fn test_pages_grow_on_demand() {
    let mut arena = arena::<u64>(2);
    assert_eq!(arena.page_count(), 0);

    let handles: Vec<_> = (0..5).map(|i| arena.insert(i)).collect();
    assert_eq!(arena.page_count(), 3);
    assert_eq!(arena.capacity(), 6);
    assert_eq!(arena.len(), 5);

    for (i, handle) in handles.iter().enumerate() {
        assert_eq!(arena.get(*handle), Some(&(i as u64)));
    }
}

#[test]
fn test_lowest_index_reused_first() {
    let mut arena = arena::<u8>(8);
    let a = arena.insert(1);
    let b = arena.insert(2);
    assert_eq!(a.index(), 0);
    assert_eq!(b.index(), 1);

    arena.remove(a);
    let c = arena.insert(3);
    assert_eq!(c.index(), 0);
    assert_ne!(c.generation(), a.generation());
}

#[test]
fn test_stale_handle_rejected() {
    let mut arena = arena::<&'static str>(4);
    let old = arena.insert("old");
    assert_eq!(arena.remove(old), Some("old"));

    let new = arena.insert("new");
    assert_eq!(new.index(), old.index());

    assert!(arena.get(old).is_none());
    assert!(arena.get_mut(old).is_none());
    assert!(arena.destroy(old).is_none());
    assert!(matches!(arena.free(old), Err(Error::InvalidResource(_))));
    assert_eq!(arena.get(new), Some(&"new"));
}

#[test]
fn test_get_mut() {
    let mut arena = arena::<Vec<u32>>(4);
    let block = arena.insert(vec![1]);
    arena.get_mut(block).unwrap().push(2);
    assert_eq!(arena.get(block), Some(&vec![1, 2]));
}

#[test]
fn test_zero_blocks_per_page_is_clamped() {
    let mut arena = arena::<i32>(0);
    assert_eq!(arena.blocks_per_page(), 1);
    arena.insert(7);
    arena.insert(8);
    assert_eq!(arena.page_count(), 2);
}

// ============================================================================
// REGISTRY TESTS
// ============================================================================

// Each test uses its own element type: the registry is process-wide.

#[test]
fn test_registry_lazily_creates_arena() {
    struct Particle(u32);

    assert!(!BlockAllocatorRegistry::is_initialized::<Particle>());
    let handle = BlockAllocatorRegistry::with::<Particle, _>(|arena| arena.insert(Particle(9)));
    assert!(BlockAllocatorRegistry::is_initialized::<Particle>());

    let value = BlockAllocatorRegistry::with::<Particle, _>(|arena| arena.get(handle).map(|p| p.0));
    assert_eq!(value, Some(9));
    BlockAllocatorRegistry::with::<Particle, _>(|arena| arena.remove(handle));
}

#[test]
fn test_registry_configure_before_first_use() {
    struct Node;

    BlockAllocatorRegistry::configure::<Node>(BlockAllocatorConfig { blocks_per_page: 3 }).unwrap();
    let blocks_per_page = BlockAllocatorRegistry::with::<Node, _>(|arena| arena.blocks_per_page());
    assert_eq!(blocks_per_page, 3);
}

#[test]
fn test_registry_configure_after_first_use_fails() {
    struct Edge;

    BlockAllocatorRegistry::with::<Edge, _>(|arena| arena.len());
    let result = BlockAllocatorRegistry::configure::<Edge>(BlockAllocatorConfig { blocks_per_page: 8 });
    assert!(matches!(result, Err(Error::InitializationFailed(_))));
}

#[test]
fn test_registry_rejects_zero_page_size() {
    struct Face;

    let result = BlockAllocatorRegistry::configure::<Face>(BlockAllocatorConfig { blocks_per_page: 0 });
    assert!(matches!(result, Err(Error::InvalidParameter(_))));
}

#[test]
fn test_registry_shared_across_threads() {
    struct Token(usize);

    let threads: Vec<_> = (0..4)
        .map(|t| {
            std::thread::spawn(move || {
                for i in 0..25 {
                    BlockAllocatorRegistry::with::<Token, _>(|arena| arena.insert(Token(t * 100 + i)));
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(BlockAllocatorRegistry::with::<Token, _>(|arena| arena.len()), 100);
}
