//! Randomized timeout adjustment.
//!
//! Election timeouts are spread out so that followers of a failed leader do
//! not all start campaigning at once.

use rand::Rng;
use std::time::Duration;

/// Extends a timeout by a uniformly random fraction of itself.
///
/// `apply(t)` returns a value in `[t, t * (1 + max_fraction))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformJitter {
    max_fraction: f64,
}

impl UniformJitter {
    /// Create a jitter of up to `max_fraction` of the timeout.
    ///
    /// Negative and non-finite fractions are treated as zero.
    pub fn new(max_fraction: f64) -> Self {
        let max_fraction = if max_fraction.is_finite() && max_fraction > 0.0 {
            max_fraction
        } else {
            0.0
        };
        Self { max_fraction }
    }

    /// No adjustment.
    pub const fn none() -> Self {
        Self { max_fraction: 0.0 }
    }

    pub fn max_fraction(&self) -> f64 {
        self.max_fraction
    }

    /// Apply using the thread-local RNG.
    pub fn apply(&self, timeout: Duration) -> Duration {
        self.apply_with(&mut rand::thread_rng(), timeout)
    }

    /// Apply using a caller-supplied RNG (seeded simulations).
    pub fn apply_with<R: Rng>(&self, rng: &mut R, timeout: Duration) -> Duration {
        if self.max_fraction == 0.0 || timeout.is_zero() {
            return timeout;
        }
        let extra = timeout.mul_f64(self.max_fraction * rng.gen::<f64>());
        timeout.saturating_add(extra)
    }
}

impl Default for UniformJitter {
    fn default() -> Self {
        Self::none()
    }
}
