//! Floating-point operation bookkeeping for performance instrumentation.

use std::cell::Cell;

/// Running flop count, updated through shared references.
#[derive(Debug, Default)]
pub struct FlopCounter {
    flops: Cell<f64>,
}

impl FlopCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, flops: f64) {
        self.flops.set(self.flops.get() + flops);
    }

    pub fn flops(&self) -> f64 {
        self.flops.get()
    }

    pub fn reset(&self) {
        self.flops.set(0.0);
    }
}
