/*!
 * Sequential Variable-Sized Allocator
 * Coalescing first-fit allocation over one growable heap
 */

use super::NULL_ADDRESS;
use crate::growth::{GrowFunction, Sqrt2Growth};
use crate::traits::{Allocator, SequentialHeapManager};
use crate::types::{Address, AllocError, AllocResult, AllocStats, Size};
use log::debug;
use std::collections::BTreeMap;

/// The most bytes we are willing to waste as padding at the end of a block
/// instead of splitting off a remainder node
const MIN_ALLOC_SIZE: Size = 64;

/// Handle into the node slab
type NodeId = usize;

/// A contiguous extent of the heap, chained to its address-order neighbors.
/// The full chain spans the heap with no gaps or overlaps.
#[derive(Debug)]
struct Node {
    base: Address,
    size: Size,
    prev: Option<NodeId>,
    next: Option<NodeId>,
    used: bool,
}

/// Allocator for arbitrarily sized regions over one growable linear heap.
///
/// Free extents are indexed by a (size, base) composite key so a ceiling
/// query finds the smallest fit; used extents are indexed by base address.
/// Adjacent free extents are merged on every free, bounding external
/// fragmentation to at most one free node between any two used nodes. Not
/// thread-safe.
///
/// alloc and free are O(log nodes); an alloc that outgrows the heap also
/// pays for the expansion round-trip through the heap manager.
pub struct SequentialVariableSizedAllocator {
    block_size: Size,
    capacity: Size,
    growth: Box<dyn GrowFunction>,
    manager: Box<dyn SequentialHeapManager>,
    /// Node slab; freed indices are recycled through `free_slots`
    nodes: Vec<Node>,
    free_slots: Vec<NodeId>,
    /// Free extents, ordered by size then base for smallest-fit queries
    free_nodes: BTreeMap<(Size, Address), NodeId>,
    /// Used extents by base address
    used_nodes: BTreeMap<Address, NodeId>,
    /// Highest-addressed node in the chain
    tail: NodeId,
}

impl SequentialVariableSizedAllocator {
    pub fn new(block_size: Size, manager: impl SequentialHeapManager + 'static) -> Self {
        Self::with_growth(block_size, manager, Sqrt2Growth::default())
    }

    pub fn with_growth(
        block_size: Size,
        manager: impl SequentialHeapManager + 'static,
        growth: impl GrowFunction + 'static,
    ) -> Self {
        assert!(block_size > 0, "block size must be positive");
        let growth: Box<dyn GrowFunction> = Box::new(growth);
        let mut manager: Box<dyn SequentialHeapManager> = Box::new(manager);

        let capacity = growth.grow(0, block_size << 4);
        manager.brk(capacity);

        // the wilderness node spans the entire fresh heap
        let wilderness = Node {
            base: 0,
            size: capacity,
            prev: None,
            next: None,
            used: false,
        };
        let mut free_nodes = BTreeMap::new();
        free_nodes.insert((capacity, 0), 0);

        Self {
            block_size,
            capacity,
            growth,
            manager,
            nodes: vec![wilderness],
            free_slots: Vec::new(),
            free_nodes,
            used_nodes: BTreeMap::new(),
            tail: 0,
        }
    }

    pub fn block_size(&self) -> Size {
        self.block_size
    }

    pub fn capacity(&self) -> Size {
        self.capacity
    }

    fn insert_node(&mut self, node: Node) -> NodeId {
        match self.free_slots.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release_node(&mut self, idx: NodeId) {
        self.free_slots.push(idx);
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
        self.manager.sbrk(new_capacity);
        self.capacity = new_capacity;
        let delta = new_capacity - old_capacity;
        debug!(
            "grew variable-size heap from {} to {} bytes",
            old_capacity, new_capacity
        );

        let tail_idx = self.tail;
        if self.nodes[tail_idx].used {
            // tail is allocated: pad it up to a block boundary and append a
            // fresh free tail for the remainder
            let old_tail_size = self.nodes[tail_idx].size;
            let padded = old_tail_size.next_multiple_of(self.block_size);
            let offset = padded - old_tail_size;
            self.nodes[tail_idx].size = padded;

            let idx = self.insert_node(Node {
                base: old_capacity + offset,
                size: delta - offset,
                prev: Some(tail_idx),
                next: None,
                used: false,
            });
            self.nodes[tail_idx].next = Some(idx);
            self.tail = idx;
            let (size, base) = (self.nodes[idx].size, self.nodes[idx].base);
            self.free_nodes.insert((size, base), idx);
        } else {
            // tail is the wilderness: extend it in place, reindexing since
            // its sort key changed
            let (base, size) = (self.nodes[tail_idx].base, self.nodes[tail_idx].size);
            self.free_nodes.remove(&(size, base));
            self.nodes[tail_idx].size = size + delta;
            self.free_nodes.insert((size + delta, base), tail_idx);
        }
        Ok(())
    }
}

impl Allocator for SequentialVariableSizedAllocator {
    fn null_address(&self) -> Address {
        NULL_ADDRESS
    }

    fn alloc(&mut self, raw_size: Size) -> AllocResult<Address> {
        if raw_size == 0 {
            return Ok(NULL_ADDRESS);
        }
        let size = raw_size.next_multiple_of(self.block_size);

        let idx = loop {
            if let Some((_, &idx)) = self.free_nodes.range((size, 0)..).next() {
                break idx;
            }
            self.expand()?;
        };
        let (base, node_size, next) = {
            let node = &self.nodes[idx];
            (node.base, node.size, node.next)
        };
        self.free_nodes.remove(&(node_size, base));

        if node_size - size > MIN_ALLOC_SIZE {
            // split off the remainder rather than wasting it as padding
            let split = self.insert_node(Node {
                base: base + size,
                size: node_size - size,
                prev: Some(idx),
                next,
                used: false,
            });
            self.nodes[idx].size = size;
            self.nodes[idx].next = Some(split);
            match next {
                Some(next_idx) => self.nodes[next_idx].prev = Some(split),
                None => self.tail = split,
            }
            let (split_size, split_base) = (self.nodes[split].size, self.nodes[split].base);
            self.free_nodes.insert((split_size, split_base), split);
        }

        self.nodes[idx].used = true;
        self.used_nodes.insert(base, idx);
        Ok(base)
    }

    fn free(&mut self, address: Address) -> AllocResult<()> {
        if address == NULL_ADDRESS {
            return Ok(());
        }

        let mut idx = self
            .used_nodes
            .remove(&address)
            .ok_or(AllocError::InvalidAddress(address))?;
        self.nodes[idx].used = false;

        // next node isn't used either, merge forwards
        if let Some(next_idx) = self.nodes[idx].next {
            if !self.nodes[next_idx].used {
                let (next_base, next_size, next_next) = {
                    let next = &self.nodes[next_idx];
                    (next.base, next.size, next.next)
                };
                self.free_nodes.remove(&(next_size, next_base));
                self.nodes[idx].size += next_size;
                self.nodes[idx].next = next_next;
                match next_next {
                    Some(nn) => self.nodes[nn].prev = Some(idx),
                    None => self.tail = idx,
                }
                self.release_node(next_idx);
            }
        }

        // previous node isn't used, fold into it and continue with it as
        // the surviving record
        if let Some(prev_idx) = self.nodes[idx].prev {
            if !self.nodes[prev_idx].used {
                let (prev_base, prev_size) = {
                    let prev = &self.nodes[prev_idx];
                    (prev.base, prev.size)
                };
                self.free_nodes.remove(&(prev_size, prev_base));
                let (cur_size, cur_next) = (self.nodes[idx].size, self.nodes[idx].next);
                self.nodes[prev_idx].size = prev_size + cur_size;
                self.nodes[prev_idx].next = cur_next;
                match cur_next {
                    Some(nn) => self.nodes[nn].prev = Some(prev_idx),
                    None => self.tail = prev_idx,
                }
                self.release_node(idx);
                idx = prev_idx;
            }
        }

        let (size, base) = (self.nodes[idx].size, self.nodes[idx].base);
        self.free_nodes.insert((size, base), idx);
        Ok(())
    }

    fn stats(&self) -> AllocStats {
        let allocations = self.used_nodes.len();
        let allocated_space = self
            .used_nodes
            .values()
            .map(|&idx| self.nodes[idx].size)
            .sum();
        AllocStats {
            heap_regions: 1,
            allocations,
            allocated_space,
            total_space: self.capacity,
        }
    }
}
