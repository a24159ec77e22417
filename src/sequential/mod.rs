/*!
 * Sequential Allocators
 * Strategies over one growable linear heap
 */

mod fixed;
mod variable;

pub use fixed::SequentialFixedSizeAllocator;
pub use variable::SequentialVariableSizedAllocator;

use crate::types::Address;

/// The null address for sequential allocators: the unsigned bit pattern of -1
pub const NULL_ADDRESS: Address = Address::MAX;
