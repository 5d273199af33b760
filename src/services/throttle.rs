//! Count-based throttle: one forward per `threshold` readings

/// Counter owned by the translator
///
/// Only valid readings are recorded. When the count reaches the threshold it
/// resets to zero and the reading that got it there is forwarded.
#[derive(Debug, Clone)]
pub struct Throttle {
    count: u64,
    threshold: u64,
}

impl Throttle {
    /// `threshold` of 0 behaves like 1 (every reading forwards)
    pub fn new(threshold: u64, initial_count: u64) -> Self {
        Self { count: initial_count, threshold: threshold.max(1) }
    }

    /// Record one reading; returns true when it should be forwarded
    pub fn record(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        if self.count >= self.threshold {
            self.count = 0;
            return true;
        }
        false
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }
}
