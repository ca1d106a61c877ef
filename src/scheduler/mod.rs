//! Cooperative priority scheduler.
//!
//! Single-threaded executor with one FIFO lane per [`Priority`]. Every step
//! polls the front task of the highest non-empty lane exactly once. A task
//! that returns `Pending` is parked until its waker fires; tasks that call
//! [`yield_now`] wake themselves immediately and go to the back of their
//! lane, which lets higher-priority work interleave at that point. Tasks in
//! [`sleep`] or a [`Deadline`] park on a timer instead of being polled until
//! it expires.
//!
//! ```text
//! offer(High, ..) ──► [Immediate][High][Normal][Low][Background]
//!                        ▲ drained first              drained last
//! ```
//!
//! State owned by tasks lives in `Rc<RefCell<_>>` cells. A borrow must never
//! be held across an `.await`, so no task can observe another task's
//! half-finished update.

mod clock;
mod timer;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};

use timer::{Timer, TimerQueue};

use futures::future::LocalBoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::time::Duration;
use thiserror::Error;

/// Priority classes, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Immediate,
    High,
    Normal,
    Low,
    Background,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Immediate,
        Priority::High,
        Priority::Normal,
        Priority::Low,
        Priority::Background,
    ];

    fn lane(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Immediate => "immediate",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
            Priority::Background => "background",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type TaskId = u64;

struct QueuedTask {
    id: TaskId,
    label: String,
    priority: Priority,
    future: LocalBoxFuture<'static, ()>,
}

/// Ids of parked tasks whose wakers fired. Shared with wakers, which must be
/// `Send + Sync`, hence the mutex even though polling is single-threaded.
#[derive(Default)]
struct WakeQueue {
    ready: Mutex<Vec<TaskId>>,
}

struct TaskWaker {
    id: TaskId,
    queue: Arc<WakeQueue>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.queue.ready.lock().push(self.id);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub offered: u64,
    pub polled: u64,
    pub completed: u64,
    /// Polls that returned `Pending`.
    pub yields: u64,
}

#[derive(Default)]
struct SchedulerState {
    lanes: [VecDeque<QueuedTask>; 5],
    parked: HashMap<TaskId, QueuedTask>,
    next_id: TaskId,
    stats: SchedulerStats,
}

impl SchedulerState {
    fn pop_next(&mut self) -> Option<QueuedTask> {
        self.lanes.iter_mut().find_map(VecDeque::pop_front)
    }
}

/// Handle to the scheduler. Clones share the same queues.
#[derive(Clone, Default)]
pub struct Scheduler {
    state: Rc<RefCell<SchedulerState>>,
    wakes: Arc<WakeQueue>,
    timers: Rc<TimerQueue>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a unit of work at `priority`. The label shows up in logs.
    pub fn offer<F>(&self, priority: Priority, label: impl Into<String>, future: F)
    where
        F: Future<Output = ()> + 'static,
    {
        let label = label.into();
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        state.stats.offered += 1;
        tracing::trace!(target: "scheduler", "offer #{id} [{priority}] {label}");
        state.lanes[priority.lane()].push_back(QueuedTask {
            id,
            label,
            priority,
            future: Box::pin(future),
        });
    }

    /// Poll the next runnable task once. Returns `false` when nothing is runnable.
    pub fn step(&self) -> bool {
        self.timers.fire_due();
        self.requeue_woken();

        let Some(mut task) = self.state.borrow_mut().pop_next() else {
            return false;
        };

        let waker = Waker::from(Arc::new(TaskWaker {
            id: task.id,
            queue: Arc::clone(&self.wakes),
        }));
        let mut cx = Context::from_waker(&waker);

        // No borrow of `state` is held while the task runs; it may offer more work.
        let poll = {
            let _timers = timer::enter(&self.timers);
            task.future.as_mut().poll(&mut cx)
        };

        let mut state = self.state.borrow_mut();
        state.stats.polled += 1;
        match poll {
            Poll::Ready(()) => {
                state.stats.completed += 1;
                tracing::trace!(target: "scheduler", "done #{} {}", task.id, task.label);
            }
            Poll::Pending => {
                state.stats.yields += 1;
                state.parked.insert(task.id, task);
            }
        }
        true
    }

    /// Run until no task is runnable and no timer is pending. When only
    /// timers remain, waits for the nearest one on its clock. Parked tasks
    /// waiting on an external event stay parked. Returns the number of polls
    /// performed.
    pub fn run_until_idle(&self) -> usize {
        let mut polls = 0;
        loop {
            while self.step() {
                polls += 1;
            }
            if !self.timers.wait_for_next() {
                return polls;
            }
        }
    }

    /// Run at most `max_steps` polls. Never waits on a timer.
    pub fn run_steps(&self, max_steps: usize) -> usize {
        let mut polls = 0;
        while polls < max_steps && self.step() {
            polls += 1;
        }
        polls
    }

    fn requeue_woken(&self) {
        let woken: Vec<TaskId> = std::mem::take(&mut *self.wakes.ready.lock());
        if woken.is_empty() {
            return;
        }

        let mut state = self.state.borrow_mut();
        for id in woken {
            if let Some(task) = state.parked.remove(&id) {
                let lane = task.priority.lane();
                state.lanes[lane].push_back(task);
            }
        }
    }

    /// Runnable tasks across all lanes, including woken-but-not-yet-requeued ones.
    pub fn queue_depth(&self) -> usize {
        self.requeue_woken();
        self.state.borrow().lanes.iter().map(VecDeque::len).sum()
    }

    pub fn depth(&self, priority: Priority) -> usize {
        self.requeue_woken();
        self.state.borrow().lanes[priority.lane()].len()
    }

    /// Tasks waiting on a waker that has not fired yet.
    pub fn parked(&self) -> usize {
        self.state.borrow().parked.len()
    }

    /// Timers registered by parked tasks.
    pub fn timers(&self) -> usize {
        self.timers.len()
    }

    /// Labels of runnable tasks in the order they would be polled.
    pub fn pending_labels(&self) -> Vec<String> {
        self.requeue_woken();
        self.state
            .borrow()
            .lanes
            .iter()
            .flat_map(|lane| lane.iter().map(|t| t.label.clone()))
            .collect()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.state.borrow().stats
    }
}

/// Give control back to the scheduler once.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Park the calling task until `duration` has passed on `clock`.
pub fn sleep(clock: &SharedClock, duration: Duration) -> Sleep {
    Sleep {
        timer: Timer::after(Rc::clone(clock), duration),
    }
}

#[must_use = "futures do nothing unless awaited"]
pub struct Sleep {
    timer: Timer,
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.timer.poll_expired(cx)
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("deadline of {0:?} elapsed")]
pub struct Elapsed(pub Duration);

/// Cooperative timeout: the wrapped future runs until its next yield point
/// after the deadline, then is dropped and `Elapsed` is returned. A wrapped
/// future that is parked is woken by the deadline's own timer.
pub fn with_deadline<T: 'static>(
    clock: SharedClock,
    timeout: Duration,
    future: impl Future<Output = T> + 'static,
) -> Deadline<T> {
    Deadline {
        future: Box::pin(future),
        timer: Timer::after(clock, timeout),
        timeout,
    }
}

#[must_use = "futures do nothing unless awaited"]
pub struct Deadline<T> {
    future: LocalBoxFuture<'static, T>,
    timer: Timer,
    timeout: Duration,
}

impl<T> Future for Deadline<T> {
    type Output = Result<T, Elapsed>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Poll::Ready(value) = self.future.as_mut().poll(cx) {
            return Poll::Ready(Ok(value));
        }
        let timeout = self.timeout;
        self.timer.poll_expired(cx).map(|()| Err(Elapsed(timeout)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recorder() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn test_highest_priority_drains_first() {
        let scheduler = Scheduler::new();
        let log = recorder();

        for (priority, label) in [
            (Priority::Background, "bg"),
            (Priority::Normal, "normal"),
            (Priority::Immediate, "immediate"),
            (Priority::Low, "low"),
            (Priority::High, "high"),
        ] {
            let log = Rc::clone(&log);
            scheduler.offer(priority, label, async move {
                log.borrow_mut().push(label.to_string());
            });
        }

        scheduler.run_until_idle();
        assert_eq!(*log.borrow(), vec!["immediate", "high", "normal", "low", "bg"]);
    }

    #[test]
    fn test_fifo_within_priority() {
        let scheduler = Scheduler::new();
        let log = recorder();

        for label in ["first", "second", "third"] {
            let log = Rc::clone(&log);
            scheduler.offer(Priority::Normal, label, async move {
                log.borrow_mut().push(label.to_string());
            });
        }

        scheduler.run_until_idle();
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_higher_priority_interleaves_at_yield_point() {
        let scheduler = Scheduler::new();
        let log = recorder();

        let inner = scheduler.clone();
        let task_log = Rc::clone(&log);
        scheduler.offer(Priority::Background, "long", async move {
            task_log.borrow_mut().push("long:1".to_string());
            let urgent_log = Rc::clone(&task_log);
            inner.offer(Priority::Immediate, "urgent", async move {
                urgent_log.borrow_mut().push("urgent".to_string());
            });
            yield_now().await;
            task_log.borrow_mut().push("long:2".to_string());
        });

        scheduler.run_until_idle();
        assert_eq!(*log.borrow(), vec!["long:1", "urgent", "long:2"]);
        assert_eq!(scheduler.stats().yields, 1);
        assert_eq!(scheduler.stats().completed, 2);
    }

    #[test]
    fn test_parked_task_resumes_when_woken() {
        let scheduler = Scheduler::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<u32>();
        let result = Rc::new(RefCell::new(None));

        let slot = Rc::clone(&result);
        scheduler.offer(Priority::Normal, "waiter", async move {
            *slot.borrow_mut() = rx.await.ok();
        });

        scheduler.run_until_idle();
        assert_eq!(scheduler.parked(), 1);
        assert!(result.borrow().is_none());

        tx.send(7).unwrap();
        scheduler.run_until_idle();
        assert_eq!(*result.borrow(), Some(7));
        assert_eq!(scheduler.parked(), 0);
    }

    #[test]
    fn test_deadline_stops_at_yield_point() {
        let scheduler = Scheduler::new();
        let clock: SharedClock = Rc::new(ManualClock::ticking(Duration::from_millis(10)));
        let outcome = Rc::new(RefCell::new(None));

        let slot = Rc::clone(&outcome);
        let timed_clock = Rc::clone(&clock);
        scheduler.offer(Priority::Normal, "slow", async move {
            let result = with_deadline(timed_clock, Duration::from_millis(25), async {
                let mut spins = 0u64;
                while spins < u64::MAX {
                    spins += 1;
                    yield_now().await;
                }
            })
            .await;
            *slot.borrow_mut() = Some(result);
        });

        scheduler.run_until_idle();
        assert_eq!(*outcome.borrow(), Some(Err(Elapsed(Duration::from_millis(25)))));
    }
    #[test]
    fn test_sleeping_task_is_not_polled_until_due() {
        let scheduler = Scheduler::new();
        let manual = Rc::new(ManualClock::new());
        let clock: SharedClock = manual.clone();
        let woke = Rc::new(RefCell::new(false));

        let flag = Rc::clone(&woke);
        scheduler.offer(Priority::Background, "sleeper", async move {
            sleep(&clock, Duration::from_millis(250)).await;
            *flag.borrow_mut() = true;
        });

        assert!(scheduler.step());
        assert_eq!(scheduler.timers(), 1);
        assert_eq!(scheduler.run_steps(100), 0);
        assert_eq!(scheduler.stats().polled, 1);

        manual.advance(Duration::from_millis(100));
        assert_eq!(scheduler.run_steps(100), 0);

        manual.advance(Duration::from_millis(150));
        assert_eq!(scheduler.run_steps(100), 1);
        assert!(*woke.borrow());
        assert_eq!(scheduler.timers(), 0);
    }

    #[test]
    fn test_idle_run_waits_out_timers() {
        let scheduler = Scheduler::new();
        let clock: SharedClock = Rc::new(ManualClock::new());
        let start = clock.now();

        let task_clock = Rc::clone(&clock);
        scheduler.offer(Priority::Normal, "sleeper", async move {
            sleep(&task_clock, Duration::from_secs(5)).await;
        });

        assert_eq!(scheduler.run_until_idle(), 2);
        assert_eq!(clock.elapsed_since(start), Duration::from_secs(5));
        assert_eq!(scheduler.stats().completed, 1);
    }

    #[test]
    fn test_deadline_wakes_parked_future() {
        let scheduler = Scheduler::new();
        let clock: SharedClock = Rc::new(ManualClock::new());
        let (_tx, rx) = tokio::sync::oneshot::channel::<u32>();
        let outcome = Rc::new(RefCell::new(None));

        let slot = Rc::clone(&outcome);
        let timed_clock = Rc::clone(&clock);
        scheduler.offer(Priority::Normal, "waiter", async move {
            let result = with_deadline(timed_clock, Duration::from_millis(40), rx).await;
            *slot.borrow_mut() = Some(result.is_err());
        });

        scheduler.run_until_idle();
        assert_eq!(*outcome.borrow(), Some(true));
        assert_eq!(scheduler.timers(), 0);
        assert_eq!(scheduler.parked(), 0);
    }

    #[test]
    fn test_dropped_sleep_cancels_its_timer() {
        let scheduler = Scheduler::new();
        let clock: SharedClock = Rc::new(ManualClock::new());
        let start = clock.now();

        let timed_clock = Rc::clone(&clock);
        scheduler.offer(Priority::Normal, "short-deadline", async move {
            let long_sleep = sleep(&timed_clock, Duration::from_secs(60));
            let _ = with_deadline(Rc::clone(&timed_clock), Duration::from_secs(1), long_sleep).await;
        });

        scheduler.run_until_idle();
        assert_eq!(scheduler.timers(), 0);
        assert_eq!(clock.elapsed_since(start), Duration::from_secs(1));
    }
}
