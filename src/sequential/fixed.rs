/*!
 * Sequential Fixed-Size Allocator
 * Bump allocation with a bitmap free-list over one growable heap
 */

use super::NULL_ADDRESS;
use crate::bitmap::SlotBitmap;
use crate::growth::{GrowFunction, Sqrt2Growth};
use crate::traits::{Allocator, SequentialHeapManager};
use crate::types::{Address, AllocError, AllocResult, AllocStats, Size};
use log::debug;

/// Allocator for many same-sized blocks over one growable linear heap.
///
/// Slots are claimed at the cached lowest clear bit and the heap grows
/// through the [`SequentialHeapManager`] the first time an allocation would
/// run past the current capacity: `brk` on the first growth from zero,
/// `sbrk` on every later one. Not thread-safe.
///
/// alloc is O(1) best case and O(slots) worst case (bitmap scan for the
/// next clear bit); free is O(1).
pub struct SequentialFixedSizeAllocator {
    block_size: Size,
    capacity: Size,
    occupancy: SlotBitmap,
    /// Lowest clear slot, the next allocation candidate
    from_index: usize,
    growth: Box<dyn GrowFunction>,
    manager: Box<dyn SequentialHeapManager>,
}

impl SequentialFixedSizeAllocator {
    pub fn new(block_size: Size, manager: impl SequentialHeapManager + 'static) -> Self {
        Self::with_growth(block_size, manager, Sqrt2Growth::default())
    }

    pub fn with_growth(
        block_size: Size,
        manager: impl SequentialHeapManager + 'static,
        growth: impl GrowFunction + 'static,
    ) -> Self {
        assert!(block_size > 0, "block size must be positive");
        Self {
            block_size,
            capacity: 0,
            occupancy: SlotBitmap::new(),
            from_index: 0,
            growth: Box::new(growth),
            manager: Box::new(manager),
        }
    }

    pub fn block_size(&self) -> Size {
        self.block_size
    }

    pub fn capacity(&self) -> Size {
        self.capacity
    }

    fn expand(&mut self) -> AllocResult<()> {
        let old_capacity = self.capacity;
        let new_capacity = self.growth.grow(old_capacity, self.block_size);
        if new_capacity <= old_capacity {
            return Err(AllocError::InvalidGrowth {
                old_capacity,
                new_capacity,
            });
        }
        if old_capacity == 0 {
            self.manager.brk(new_capacity);
        } else {
            self.manager.sbrk(new_capacity);
        }
        self.capacity = new_capacity;
        debug!(
            "grew fixed-size heap from {} to {} bytes",
            old_capacity, new_capacity
        );
        Ok(())
    }
}

impl Allocator for SequentialFixedSizeAllocator {
    fn null_address(&self) -> Address {
        NULL_ADDRESS
    }

    fn alloc(&mut self, size: Size) -> AllocResult<Address> {
        if size == 0 {
            return Ok(NULL_ADDRESS);
        }
        if size != self.block_size {
            return Err(AllocError::SizeMismatch {
                requested: size,
                block_size: self.block_size,
            });
        }

        let slot = self.from_index;
        let address = slot * self.block_size;
        while address + self.block_size > self.capacity {
            self.expand()?;
        }

        self.occupancy.set(slot);
        self.from_index = self.occupancy.next_clear_bit(slot + 1);
        Ok(address)
    }

    fn free(&mut self, address: Address) -> AllocResult<()> {
        if address == NULL_ADDRESS {
            return Ok(());
        }
        if address % self.block_size != 0 {
            return Err(AllocError::InvalidAddress(address));
        }
        let slot = address / self.block_size;
        if !self.occupancy.get(slot) {
            return Err(AllocError::InvalidAddress(address));
        }

        self.occupancy.clear(slot);
        if slot < self.from_index {
            self.from_index = slot;
        }
        Ok(())
    }

    fn stats(&self) -> AllocStats {
        let allocations = self.occupancy.count_set();
        AllocStats {
            heap_regions: usize::from(self.capacity > 0),
            allocations,
            allocated_space: allocations * self.block_size,
            total_space: self.capacity,
        }
    }
}
