/*!
 * Region Allocator Library
 *
 * Memory-region allocators for logical address spaces. Addresses are opaque
 * integers scoped to the issuing allocator; callers decide what an address
 * ultimately maps to (a growable buffer, an off-heap arena, real process
 * memory, or any other linear byte range).
 *
 * ## Strategies
 *
 * - **DirectMemoryAllocator**: thread-safe allocation over the process's
 *   native heap with leak tracking and optional zero-fill
 * - **FragmentedFixedSizeAllocator**: same-sized blocks carved out of
 *   arenas leased from a delegate allocator
 * - **SequentialFixedSizeAllocator**: same-sized blocks over one growable
 *   linear heap (bump pointer + bitmap free-list)
 * - **SequentialVariableSizedAllocator**: arbitrarily sized regions over
 *   one growable linear heap with coalescing on every free
 *
 * The sequential strategies request capacity changes through a
 * [`SequentialHeapManager`] (`brk`/`sbrk`) and size them with a pluggable
 * [`GrowFunction`] policy.
 */

mod bitmap;
pub mod direct;
pub mod fragmented;
pub mod growth;
pub mod sequential;
pub mod traits;
pub mod types;

// Re-exports
pub use direct::DirectMemoryAllocator;
pub use fragmented::{FragmentedFixedSizeAllocator, DEFAULT_ARENA_CAPACITY};
pub use growth::{GrowFunction, Pow2Growth, Sqrt2Growth, DEFAULT_GROW_STEP};
pub use sequential::{SequentialFixedSizeAllocator, SequentialVariableSizedAllocator};
pub use traits::{Allocator, SequentialHeapManager, UnifiedHeapManager};
pub use types::{Address, AllocError, AllocResult, AllocStats, Size};
