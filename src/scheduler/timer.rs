//! Timers for tasks waiting on a clock.
//!
//! A waiting task registers its deadline and waker with the timer queue of
//! the scheduler that is polling it, then stays parked. Every scheduler step
//! wakes the entries whose deadline has passed on their own clock.

use super::clock::SharedClock;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

type TimerId = u64;

struct TimerEntry {
    deadline: Instant,
    clock: SharedClock,
    waker: Waker,
}

#[derive(Default)]
pub(super) struct TimerQueue {
    entries: RefCell<HashMap<TimerId, TimerEntry>>,
    next_id: Cell<TimerId>,
}

impl TimerQueue {
    fn register(&self, clock: SharedClock, deadline: Instant, waker: Waker) -> TimerId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.entries.borrow_mut().insert(
            id,
            TimerEntry {
                deadline,
                clock,
                waker,
            },
        );
        id
    }

    fn refresh(&self, id: TimerId, waker: &Waker) {
        if let Some(entry) = self.entries.borrow_mut().get_mut(&id)
            && !entry.waker.will_wake(waker)
        {
            entry.waker = waker.clone();
        }
    }

    fn cancel(&self, id: TimerId) {
        self.entries.borrow_mut().remove(&id);
    }

    pub(super) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Wake and drop every expired entry. Returns how many fired.
    pub(super) fn fire_due(&self) -> usize {
        let due: Vec<TimerEntry> = {
            let mut entries = self.entries.borrow_mut();
            let ids: Vec<TimerId> = entries
                .iter()
                .filter(|(_, entry)| entry.clock.now() >= entry.deadline)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| entries.remove(id)).collect()
        };

        // Wakers run with no borrow held
        let fired = due.len();
        for entry in due {
            entry.waker.wake();
        }
        fired
    }

    /// Wait out the entry closest to expiry on its clock. Returns `false`
    /// when no timer is registered.
    pub(super) fn wait_for_next(&self) -> bool {
        let next = {
            let entries = self.entries.borrow();
            entries
                .values()
                .min_by_key(|entry| entry.deadline.saturating_duration_since(entry.clock.now()))
                .map(|entry| (Rc::clone(&entry.clock), entry.deadline))
        };

        match next {
            Some((clock, deadline)) => {
                tracing::trace!(target: "scheduler", "idle until next timer");
                clock.sleep_until(deadline);
                true
            }
            None => false,
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Weak<TimerQueue>>> = const { RefCell::new(None) };
}

/// Makes `queue` the target of timer registrations until dropped.
pub(super) struct EnterGuard {
    previous: Option<Weak<TimerQueue>>,
}

pub(super) fn enter(queue: &Rc<TimerQueue>) -> EnterGuard {
    let previous = CURRENT.with(|current| current.replace(Some(Rc::downgrade(queue))));
    EnterGuard { previous }
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

fn current() -> Option<Weak<TimerQueue>> {
    CURRENT.with(|current| current.borrow().clone())
}

/// A deadline on a clock, registered lazily on first poll.
pub(super) struct Timer {
    clock: SharedClock,
    deadline: Instant,
    registration: Option<(Weak<TimerQueue>, TimerId)>,
}

impl Timer {
    pub(super) fn after(clock: SharedClock, duration: Duration) -> Self {
        let deadline = clock.now() + duration;
        Self {
            clock,
            deadline,
            registration: None,
        }
    }

    pub(super) fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        if self.clock.now() >= self.deadline {
            self.cancel();
            return Poll::Ready(());
        }

        if let Some((queue, id)) = &self.registration
            && let Some(queue) = queue.upgrade()
        {
            queue.refresh(*id, cx.waker());
            return Poll::Pending;
        }

        match current().and_then(|weak| weak.upgrade().map(|queue| (weak, queue))) {
            Some((weak, queue)) => {
                let id = queue.register(Rc::clone(&self.clock), self.deadline, cx.waker().clone());
                self.registration = Some((weak, id));
            }
            // Polled outside a scheduler: fall back to checking again on the next poll
            None => cx.waker().wake_by_ref(),
        }
        Poll::Pending
    }

    fn cancel(&mut self) {
        if let Some((queue, id)) = self.registration.take()
            && let Some(queue) = queue.upgrade()
        {
            queue.cancel(id);
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}
