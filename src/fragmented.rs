/*!
 * Fragmented Fixed-Size Allocator
 * Same-sized blocks carved out of arenas leased from a delegate allocator
 */

use crate::bitmap::SlotBitmap;
use crate::traits::Allocator;
use crate::types::{Address, AllocError, AllocResult, AllocStats, Size};
use log::debug;
use std::collections::{BTreeMap, VecDeque};

/// Default number of block slots per arena
pub const DEFAULT_ARENA_CAPACITY: usize = 4096;

/// A fixed-capacity chunk of address space leased from the delegate,
/// managed by a slot occupancy bitmap with a cached lowest-clear-bit index.
#[derive(Debug)]
struct Arena {
    start: Address,
    end: Address,
    occupancy: SlotBitmap,
    /// Smallest unset slot, equal to the capacity when the arena is full
    lowest_clear: usize,
    used: usize,
}

/// Allocator for many same-sized blocks, backed by a delegate [`Allocator`]
/// that supplies arena-sized chunks.
///
/// Arenas are created lazily on the first allocation with no non-full arena
/// available and returned to the delegate the instant their last occupant
/// is freed. The most recently freed arena is tried first, biasing reuse
/// toward warm chunks. Not thread-safe.
///
/// alloc is O(1) best case (front arena, cached clear slot) and
/// O(log arenas + arena capacity) worst case; free is O(log arenas).
pub struct FragmentedFixedSizeAllocator {
    block_size: Size,
    arena_capacity: usize,
    delegate: Box<dyn Allocator>,
    /// All arenas, keyed by start address for floor lookup on free
    arenas: BTreeMap<Address, Arena>,
    /// Non-full arena start addresses, most recently freed at the front
    non_full: VecDeque<Address>,
}

impl FragmentedFixedSizeAllocator {
    pub fn new(block_size: Size, delegate: impl Allocator + 'static) -> Self {
        Self::with_arena_capacity(block_size, DEFAULT_ARENA_CAPACITY, delegate)
    }

    pub fn with_arena_capacity(
        block_size: Size,
        arena_capacity: usize,
        delegate: impl Allocator + 'static,
    ) -> Self {
        assert!(block_size > 0, "block size must be positive");
        assert!(arena_capacity > 0, "arena capacity must be positive");
        Self {
            block_size,
            arena_capacity,
            delegate: Box::new(delegate),
            arenas: BTreeMap::new(),
            non_full: VecDeque::new(),
        }
    }

    pub fn block_size(&self) -> Size {
        self.block_size
    }

    pub fn arena_capacity(&self) -> usize {
        self.arena_capacity
    }

    /// The delegate supplying arena-sized chunks
    pub fn delegate(&self) -> &dyn Allocator {
        self.delegate.as_ref()
    }

    fn create_arena(&mut self) -> AllocResult<()> {
        let chunk_size = self.block_size * self.arena_capacity;
        let start = self.delegate.alloc(chunk_size)?;
        let end = start + chunk_size;
        debug!("created arena [0x{:x}, 0x{:x})", start, end);
        self.arenas.insert(
            start,
            Arena {
                start,
                end,
                occupancy: SlotBitmap::with_capacity(self.arena_capacity),
                lowest_clear: 0,
                used: 0,
            },
        );
        self.non_full.push_front(start);
        Ok(())
    }
}

impl Allocator for FragmentedFixedSizeAllocator {
    fn null_address(&self) -> Address {
        self.delegate.null_address()
    }

    fn alloc(&mut self, size: Size) -> AllocResult<Address> {
        if size == 0 {
            return Ok(self.delegate.null_address());
        }
        if size != self.block_size {
            return Err(AllocError::SizeMismatch {
                requested: size,
                block_size: self.block_size,
            });
        }

        if self.non_full.is_empty() {
            self.create_arena()?;
        }
        let start = *self
            .non_full
            .front()
            .expect("a non-full arena is registered above");
        let arena = self
            .arenas
            .get_mut(&start)
            .expect("non-full arenas are always registered");

        let slot = arena.lowest_clear;
        if slot >= self.arena_capacity {
            // a full arena may never sit in the non-full queue
            return Err(AllocError::Exhausted(size));
        }
        arena.occupancy.set(slot);
        arena.used += 1;
        arena.lowest_clear = arena.occupancy.next_clear_bit(slot + 1);
        if arena.lowest_clear >= self.arena_capacity {
            self.non_full.pop_front();
        }
        Ok(start + slot * self.block_size)
    }

    fn free(&mut self, address: Address) -> AllocResult<()> {
        if address == self.delegate.null_address() {
            return Ok(());
        }

        let (&start, arena) = self
            .arenas
            .range_mut(..=address)
            .next_back()
            .ok_or(AllocError::InvalidAddress(address))?;
        if address >= arena.end {
            return Err(AllocError::InvalidAddress(address));
        }
        let offset = address - arena.start;
        if offset % self.block_size != 0 {
            return Err(AllocError::InvalidAddress(address));
        }
        let slot = offset / self.block_size;
        if !arena.occupancy.get(slot) {
            return Err(AllocError::InvalidAddress(address));
        }

        let was_full = arena.lowest_clear >= self.arena_capacity;
        arena.occupancy.clear(slot);
        arena.used -= 1;
        if slot < arena.lowest_clear {
            arena.lowest_clear = slot;
        }
        let emptied = arena.used == 0;

        if emptied {
            self.arenas.remove(&start);
            if !was_full {
                if let Some(pos) = self.non_full.iter().position(|&a| a == start) {
                    self.non_full.remove(pos);
                }
            }
            debug!("destroyed empty arena at 0x{:x}", start);
            self.delegate.free(start)?;
        } else if was_full {
            // bias reuse toward the most recently freed arena
            self.non_full.push_front(start);
        }
        Ok(())
    }

    fn stats(&self) -> AllocStats {
        let allocations: usize = self.arenas.values().map(|arena| arena.used).sum();
        AllocStats {
            heap_regions: self.arenas.len(),
            allocations,
            allocated_space: allocations * self.block_size,
            total_space: self.arenas.len() * self.arena_capacity * self.block_size,
        }
    }
}
