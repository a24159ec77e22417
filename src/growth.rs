/*!
 * Growth Policies
 * Pure policies for computing a new heap capacity from an old one
 */

use crate::types::Size;

/// Default rounding step for growth policies: 4 KiB
pub const DEFAULT_GROW_STEP: Size = 4 * 1024;

/// Policy converting (current capacity, minimum increment) into a new,
/// larger capacity.
///
/// Implementations must return at least `old_capacity + increment`; the
/// sequential allocators verify the result is strictly increasing on every
/// growth and reject the policy otherwise.
pub trait GrowFunction {
    /// Compute the capacity to grow to
    fn grow(&self, old_capacity: Size, increment: Size) -> Size;
}

/// Sub-doubling growth: multiples of sqrt(2), rounded up to a step
#[derive(Debug, Clone, Copy)]
pub struct Sqrt2Growth {
    step: Size,
}

impl Sqrt2Growth {
    pub fn new(step: Size) -> Self {
        assert!(step > 0, "step must be positive");
        Self { step }
    }
}

impl Default for Sqrt2Growth {
    fn default() -> Self {
        Self::new(DEFAULT_GROW_STEP)
    }
}

impl GrowFunction for Sqrt2Growth {
    fn grow(&self, old_capacity: Size, increment: Size) -> Size {
        let scaled = (old_capacity as f64 * std::f64::consts::SQRT_2).ceil() as Size;
        (old_capacity + increment)
            .max(scaled)
            .next_multiple_of(self.step)
    }
}

/// Doubling growth, rounded up to a step
#[derive(Debug, Clone, Copy)]
pub struct Pow2Growth {
    step: Size,
}

impl Pow2Growth {
    pub fn new(step: Size) -> Self {
        assert!(step > 0, "step must be positive");
        Self { step }
    }
}

impl Default for Pow2Growth {
    fn default() -> Self {
        Self::new(DEFAULT_GROW_STEP)
    }
}

impl GrowFunction for Pow2Growth {
    fn grow(&self, old_capacity: Size, increment: Size) -> Size {
        (old_capacity + increment)
            .max(old_capacity * 2)
            .next_multiple_of(self.step)
    }
}
