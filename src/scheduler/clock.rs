//! Wall-clock abstraction so time-based yielding and timeouts can be tested.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;

    fn elapsed_since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }

    /// Block until `deadline` has passed on this clock. The scheduler calls
    /// this when every remaining task is waiting on a timer.
    fn sleep_until(&self, deadline: Instant);
}

pub type SharedClock = Rc<dyn Clock>;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Cell<Duration>,
    /// Advanced on every `now()` call when non-zero.
    auto_step: Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Cell::new(Duration::ZERO),
            auto_step: Cell::new(Duration::ZERO),
        }
    }

    /// A clock that advances by `step` each time it is read.
    pub fn ticking(step: Duration) -> Self {
        let clock = Self::new();
        clock.auto_step.set(step);
        clock
    }

    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let now = self.base + self.offset.get();
        let step = self.auto_step.get();
        if !step.is_zero() {
            self.offset.set(self.offset.get() + step);
        }
        now
    }

    /// Jumps straight to `deadline` instead of waiting.
    fn sleep_until(&self, deadline: Instant) {
        let now = self.base + self.offset.get();
        if deadline > now {
            self.offset.set(self.offset.get() + (deadline - now));
        }
    }
}
