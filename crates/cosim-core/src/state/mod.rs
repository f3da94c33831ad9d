//! Run-level counters and termination bookkeeping.

/// Termination causes, exit statuses and the run summary.
pub mod run_state;

pub use run_state::{RunSummary, TerminationCause};

/// Cycles elapsed since the start of the run or the last marker reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CycleCounter {
    count: u64,
}

impl CycleCounter {
    /// Creates a counter at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self { count: 0 }
    }

    /// Current count.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.count
    }

    /// Advances the counter by one cycle.
    #[allow(clippy::missing_const_for_fn)]
    pub fn increment(&mut self) {
        self.count += 1;
    }

    /// Restarts counting from zero.
    #[allow(clippy::missing_const_for_fn)]
    pub fn reset(&mut self) {
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::CycleCounter;

    #[test]
    fn counter_increments_and_resets() {
        let mut counter = CycleCounter::new();
        counter.increment();
        counter.increment();
        assert_eq!(counter.get(), 2);

        counter.reset();
        assert_eq!(counter.get(), 0);
        counter.increment();
        assert_eq!(counter.get(), 1);
    }
}
