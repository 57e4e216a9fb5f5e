//! Lock-free `f64` cell shared between rate setters and the hot path.

use std::sync::atomic::{AtomicU64, Ordering};

/// An `f64` stored as its bit pattern in an [`AtomicU64`].
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    /// A cell holding `value`.
    pub fn new(value: f64) -> Self {
        AtomicF64(AtomicU64::new(value.to_bits()))
    }

    /// Current value.
    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Replace the value.
    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_and_load() {
        let cell = AtomicF64::new(1.5);
        assert_eq!(cell.load(), 1.5);
        cell.store(-0.25);
        assert_eq!(cell.load(), -0.25);
        assert_eq!(AtomicF64::default().load(), 0.0);
    }
}
