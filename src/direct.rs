/*!
 * Direct Memory Allocator
 * Thread-safe allocation over the process's native heap with leak tracking
 */

use crate::traits::Allocator;
use crate::types::{Address, AllocError, AllocResult, AllocStats, Size};
use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::alloc::Layout;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// The null address for direct memory: a real null pointer
pub const NULL_ADDRESS: Address = 0;

/// Alignment for every direct allocation
const DEFAULT_ALIGNMENT: usize = std::mem::align_of::<usize>();

/// Thread-safe allocator over the process's native address space.
///
/// Every live allocation is tracked in a concurrent address -> size map,
/// which backs `realloc`'s old-size lookup, `free` validation, and
/// [`stats`](DirectMemoryAllocator::stats). All operations may be called
/// from any thread; [`close`](DirectMemoryAllocator::close) is serialized
/// and permanently disables further operations. Dropping the allocator
/// without closing it forcibly frees anything still outstanding and
/// reports the leak through a log warning.
pub struct DirectMemoryAllocator {
    allocations: DashMap<Address, Size, RandomState>,
    used_bytes: AtomicUsize,
    zeroed: bool,
    closed: AtomicBool,
    close_lock: Mutex<()>,
}

impl DirectMemoryAllocator {
    pub fn new() -> Self {
        Self::with_zeroing(false)
    }

    /// Create an allocator whose new bytes are zero-filled.
    ///
    /// On a growing `realloc` only the newly added tail is zeroed; existing
    /// bytes are never re-zeroed.
    pub fn new_zeroed() -> Self {
        Self::with_zeroing(true)
    }

    pub fn with_zeroing(zeroed: bool) -> Self {
        Self {
            allocations: DashMap::with_hasher(RandomState::new()),
            used_bytes: AtomicUsize::new(0),
            zeroed,
            closed: AtomicBool::new(false),
            close_lock: Mutex::new(()),
        }
    }

    fn ensure_open(&self) -> AllocResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(AllocError::Closed)
        } else {
            Ok(())
        }
    }

    fn layout_for(size: Size) -> AllocResult<Layout> {
        Layout::from_size_align(size, DEFAULT_ALIGNMENT).map_err(|_| AllocError::Exhausted(size))
    }

    /// Allocate a region of native memory
    pub fn alloc(&self, size: Size) -> AllocResult<Address> {
        self.ensure_open()?;
        if size == 0 {
            return Ok(NULL_ADDRESS);
        }

        let layout = Self::layout_for(size)?;
        // SAFETY: layout has non-zero size, checked above
        let ptr = unsafe {
            if self.zeroed {
                std::alloc::alloc_zeroed(layout)
            } else {
                std::alloc::alloc(layout)
            }
        };
        if ptr.is_null() {
            return Err(AllocError::Exhausted(size));
        }

        let address = ptr as Address;
        self.allocations.insert(address, size);
        self.used_bytes.fetch_add(size, Ordering::Relaxed);
        trace!("allocated {} bytes at 0x{:x}", size, address);
        Ok(address)
    }

    /// Resize a region, preserving contents up to the smaller size
    pub fn realloc(&self, address: Address, new_size: Size) -> AllocResult<Address> {
        self.ensure_open()?;
        if address == NULL_ADDRESS {
            return self.alloc(new_size);
        }
        if new_size == 0 {
            self.free(address)?;
            return Ok(NULL_ADDRESS);
        }

        let (_, old_size) = self
            .allocations
            .remove(&address)
            .ok_or(AllocError::InvalidAddress(address))?;
        let old_layout = Self::layout_for(old_size)?;
        Self::layout_for(new_size)?;

        // SAFETY: address was produced by alloc with old_layout and is
        // still live; new_size is non-zero and layout-checked above
        let ptr = unsafe { std::alloc::realloc(address as *mut u8, old_layout, new_size) };
        if ptr.is_null() {
            // the old region is untouched on failure; restore tracking
            self.allocations.insert(address, old_size);
            return Err(AllocError::Exhausted(new_size));
        }
        if self.zeroed && new_size > old_size {
            // SAFETY: ptr is valid for new_size bytes; only the grown tail
            // is written
            unsafe { std::ptr::write_bytes(ptr.add(old_size), 0, new_size - old_size) };
        }

        let new_address = ptr as Address;
        self.allocations.insert(new_address, new_size);
        self.used_bytes.fetch_sub(old_size, Ordering::Relaxed);
        self.used_bytes.fetch_add(new_size, Ordering::Relaxed);
        trace!(
            "reallocated 0x{:x} ({} bytes) to 0x{:x} ({} bytes)",
            address,
            old_size,
            new_address,
            new_size
        );
        Ok(new_address)
    }

    /// Release a region of native memory
    pub fn free(&self, address: Address) -> AllocResult<()> {
        self.ensure_open()?;
        if address == NULL_ADDRESS {
            return Ok(());
        }

        let (_, size) = self
            .allocations
            .remove(&address)
            .ok_or(AllocError::InvalidAddress(address))?;
        // SAFETY: address was produced by alloc/realloc with this exact
        // layout and is removed from tracking before the release
        unsafe {
            std::alloc::dealloc(
                address as *mut u8,
                Layout::from_size_align_unchecked(size, DEFAULT_ALIGNMENT),
            )
        };
        self.used_bytes.fetch_sub(size, Ordering::Relaxed);
        trace!("freed {} bytes at 0x{:x}", size, address);
        Ok(())
    }

    /// Get a snapshot of this allocator's current state
    pub fn stats(&self) -> AllocStats {
        let allocations = self.allocations.len();
        let allocated_space = self.used_bytes.load(Ordering::Relaxed);
        AllocStats {
            heap_regions: allocations,
            allocations,
            allocated_space,
            total_space: allocated_space,
        }
    }

    /// Close the allocator, releasing every remaining allocation.
    ///
    /// Fails with [`AllocError::Closed`] if already closed. After a
    /// successful close every other operation fails with the same error.
    pub fn close(&self) -> AllocResult<()> {
        let _guard = self.close_lock.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(AllocError::Closed);
        }

        let (count, bytes) = self.release_all();
        debug!(
            "closed direct memory allocator, released {} allocations ({} bytes)",
            count, bytes
        );
        Ok(())
    }

    fn release_all(&self) -> (usize, Size) {
        let entries: Vec<(Address, Size)> = self
            .allocations
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();

        let mut count = 0;
        let mut bytes = 0;
        for (address, size) in entries {
            if self.allocations.remove(&address).is_some() {
                // SAFETY: address was produced by alloc/realloc with this
                // exact layout and is removed from tracking
                unsafe {
                    std::alloc::dealloc(
                        address as *mut u8,
                        Layout::from_size_align_unchecked(size, DEFAULT_ALIGNMENT),
                    )
                };
                self.used_bytes.fetch_sub(size, Ordering::Relaxed);
                count += 1;
                bytes += size;
            }
        }
        (count, bytes)
    }
}

impl Allocator for DirectMemoryAllocator {
    fn null_address(&self) -> Address {
        NULL_ADDRESS
    }

    fn alloc(&mut self, size: Size) -> AllocResult<Address> {
        DirectMemoryAllocator::alloc(self, size)
    }

    fn realloc(&mut self, address: Address, new_size: Size) -> AllocResult<Address> {
        DirectMemoryAllocator::realloc(self, address, new_size)
    }

    fn free(&mut self, address: Address) -> AllocResult<()> {
        DirectMemoryAllocator::free(self, address)
    }

    fn stats(&self) -> AllocStats {
        DirectMemoryAllocator::stats(self)
    }
}

impl Default for DirectMemoryAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DirectMemoryAllocator {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Acquire) {
            let (count, bytes) = self.release_all();
            if count > 0 {
                warn!(
                    "direct memory allocator dropped without close, forcibly freed {} allocations ({} bytes)",
                    count, bytes
                );
            }
        }
    }
}
