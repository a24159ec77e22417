/*!
 * Fragmented Fixed-Size Allocator Tests
 * Arena lifecycle, slot reuse, and delegate leasing
 */

use pretty_assertions::assert_eq;
use region_alloc::{
    AllocError, Allocator, FragmentedFixedSizeAllocator, SequentialVariableSizedAllocator,
    UnifiedHeapManager,
};

const BLOCK: usize = 16;
const ARENA_CAPACITY: usize = 4;

fn fragmented() -> FragmentedFixedSizeAllocator {
    let delegate = SequentialVariableSizedAllocator::new(1, UnifiedHeapManager::new(|_| {}));
    FragmentedFixedSizeAllocator::with_arena_capacity(BLOCK, ARENA_CAPACITY, delegate)
}

#[test]
fn test_size_must_match_block_size() {
    let mut allocator = fragmented();
    assert_eq!(allocator.block_size(), BLOCK);
    assert_eq!(allocator.arena_capacity(), ARENA_CAPACITY);

    let err = allocator.alloc(BLOCK + 1).expect_err("mismatched size");
    assert_eq!(
        err,
        AllocError::SizeMismatch {
            requested: BLOCK + 1,
            block_size: BLOCK,
        }
    );
}

#[test]
fn test_arena_created_lazily_and_packed() {
    let mut allocator = fragmented();
    assert_eq!(allocator.stats().heap_regions, 0, "no arena before first alloc");

    let first = allocator.alloc(BLOCK).expect("alloc");
    let stats = allocator.stats();
    assert_eq!(stats.heap_regions, 1);
    assert_eq!(stats.total_space, BLOCK * ARENA_CAPACITY);

    // slots are claimed lowest-first, giving consecutive addresses
    for slot in 1..ARENA_CAPACITY {
        let address = allocator.alloc(BLOCK).expect("alloc");
        assert_eq!(address, first + slot * BLOCK);
    }
    assert_eq!(allocator.stats().heap_regions, 1, "one arena holds a full run");
}

#[test]
fn test_freed_slot_reused_before_new_arena() {
    let mut allocator = fragmented();

    // fill one arena and spill into a second
    let mut addresses = Vec::new();
    for _ in 0..ARENA_CAPACITY + 1 {
        addresses.push(allocator.alloc(BLOCK).expect("alloc"));
    }
    assert_eq!(allocator.stats().heap_regions, 2);

    // freeing one slot must make the next alloc reuse it instead of
    // creating a third arena
    let recycled = addresses[1];
    allocator.free(recycled).expect("free");
    let address = allocator.alloc(BLOCK).expect("alloc");
    assert_eq!(address, recycled, "freed slot must be recycled");
    assert_eq!(allocator.stats().heap_regions, 2, "no new arena may appear");
}

#[test]
fn test_most_recently_freed_arena_is_tried_first() {
    let mut allocator = fragmented();

    // two full arenas
    let mut addresses = Vec::new();
    for _ in 0..2 * ARENA_CAPACITY {
        addresses.push(allocator.alloc(BLOCK).expect("alloc"));
    }

    // free one slot in the first arena, then one in the second; the second
    // arena was freed most recently so its slot is handed out first
    allocator.free(addresses[0]).expect("free");
    allocator.free(addresses[ARENA_CAPACITY]).expect("free");

    assert_eq!(
        allocator.alloc(BLOCK).expect("alloc"),
        addresses[ARENA_CAPACITY]
    );
    assert_eq!(allocator.alloc(BLOCK).expect("alloc"), addresses[0]);
}

#[test]
fn test_empty_arena_returned_to_delegate() {
    let mut allocator = fragmented();

    let mut addresses = Vec::new();
    for _ in 0..ARENA_CAPACITY + 1 {
        addresses.push(allocator.alloc(BLOCK).expect("alloc"));
    }
    assert_eq!(allocator.stats().heap_regions, 2);
    assert_eq!(allocator.delegate().stats().allocations, 2);

    // draining the first arena must destroy it the instant the last
    // occupant leaves
    for &address in &addresses[..ARENA_CAPACITY] {
        allocator.free(address).expect("free");
    }
    assert_eq!(allocator.stats().heap_regions, 1);
    assert_eq!(allocator.delegate().stats().allocations, 1);

    allocator.free(addresses[ARENA_CAPACITY]).expect("free");
    assert_eq!(allocator.stats().heap_regions, 0);
    assert_eq!(allocator.delegate().stats().allocations, 0);
}

#[test]
fn test_free_rejects_foreign_and_misaligned_addresses() {
    let mut allocator = fragmented();
    let address = allocator.alloc(BLOCK).expect("alloc");

    // below every arena
    if address > 0 {
        assert_eq!(
            allocator.free(address.wrapping_sub(BLOCK)),
            Err(AllocError::InvalidAddress(address.wrapping_sub(BLOCK)))
        );
    }
    // inside the arena but not on a block boundary
    assert_eq!(
        allocator.free(address + 1),
        Err(AllocError::InvalidAddress(address + 1))
    );
    // past the arena's end
    let past = address + BLOCK * ARENA_CAPACITY;
    assert_eq!(allocator.free(past), Err(AllocError::InvalidAddress(past)));

    // a clear slot in a live arena
    let clear_slot = address + BLOCK;
    assert_eq!(
        allocator.free(clear_slot),
        Err(AllocError::InvalidAddress(clear_slot))
    );

    allocator.free(address).expect("free");
    assert_eq!(
        allocator.free(address),
        Err(AllocError::InvalidAddress(address)),
        "double free must be rejected"
    );
}

#[test]
fn test_stats_aggregate_over_arenas() {
    let mut allocator = fragmented();
    for _ in 0..ARENA_CAPACITY + 2 {
        allocator.alloc(BLOCK).expect("alloc");
    }

    let stats = allocator.stats();
    assert_eq!(stats.heap_regions, 2);
    assert_eq!(stats.allocations, ARENA_CAPACITY + 2);
    assert_eq!(stats.allocated_space, (ARENA_CAPACITY + 2) * BLOCK);
    assert_eq!(stats.total_space, 2 * ARENA_CAPACITY * BLOCK);
}
