//! Cooperative yielding for long-running loops on the worker.
//!
//! Chunked copies, CRC scans and directory walks call [`YieldBudget::tick`] once per
//! iteration; every `every` ticks the budget hands the processor back through a
//! [`CooperativeYield`] so higher-priority work on the host is not starved.

use std::thread;
use std::time::Duration;

/// Something that can cede the processor for a short while.
pub trait CooperativeYield: Send + Sync {
    fn yield_now(&self);
}

/// Default yielder: sleep for a fixed interval, or `thread::yield_now` when zero.
#[derive(Debug, Clone, Copy)]
pub struct ThreadYield {
    sleep: Duration,
}

impl ThreadYield {
    pub fn new(sleep: Duration) -> Self {
        Self { sleep }
    }
}

impl CooperativeYield for ThreadYield {
    fn yield_now(&self) {
        if self.sleep.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(self.sleep);
        }
    }
}

/// Iteration counter that yields every `every` ticks. `every == 0` never yields.
pub struct YieldBudget<'a> {
    yielder: &'a dyn CooperativeYield,
    every: u32,
    count: u32,
}

impl<'a> YieldBudget<'a> {
    pub fn new(yielder: &'a dyn CooperativeYield, every: u32) -> Self {
        Self {
            yielder,
            every,
            count: 0,
        }
    }

    pub fn tick(&mut self) {
        if self.every == 0 {
            return;
        }
        self.count += 1;
        if self.count >= self.every {
            self.count = 0;
            self.yielder.yield_now();
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::CooperativeYield;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub(crate) struct CountingYield(AtomicUsize);

    impl CountingYield {
        pub(crate) fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl CooperativeYield for CountingYield {
        fn yield_now(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}
