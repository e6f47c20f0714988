//! Cooperative task queue.
//!
//! A FIFO queue of closures and pure time gates, stepped by a single
//! external tick per frame/interval. Each tick runs at most the work that
//! was already queued and due when the tick began, then returns; the queue
//! never blocks the calling thread waiting for a delay to elapse. Anything
//! that waits on an external asynchronous result does so by re-enqueueing a
//! "check again" closure behind a delay gate.
//!
//! [`TaskQueue::abort`] is the queue's only cancellation primitive: it
//! clears every pending entry without running it, and is safe to call on an
//! empty queue.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

/// A queued unit of work. Receives the tick's logical `now`.
pub type TaskFn = Box<dyn FnOnce(Instant) + Send>;

enum QueueEntry {
    /// Run a closure.
    Run(TaskFn),
    /// Pure time gate. Arms itself (deadline = now + duration) the first
    /// time a tick reaches it; until due it blocks everything behind it.
    Delay {
        duration: Duration,
        deadline: Option<Instant>,
    },
}

/// FIFO queue of delayed/immediate work items.
///
/// Tasks execute in enqueue order; delays only postpone, they never reorder
/// work past already-due entries. The internal lock is released while a task
/// runs, so tasks may enqueue further work; anything enqueued during a tick
/// waits for the next tick.
#[derive(Default)]
pub struct TaskQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an immediate unit of work.
    pub fn enqueue(&self, task: impl FnOnce(Instant) + Send + 'static) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(QueueEntry::Run(Box::new(task)));
    }

    /// Append a pure time gate.
    pub fn enqueue_delay(&self, duration: Duration) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(QueueEntry::Delay {
                duration,
                deadline: None,
            });
    }

    /// Clear the entire pending queue without running remaining entries.
    ///
    /// Idempotent; a no-op on an empty queue.
    pub fn abort(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if !entries.is_empty() {
            debug!("aborting task queue with {} pending entries", entries.len());
            entries.clear();
        }
    }

    /// Number of pending entries (delay gates included).
    pub fn pending(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether nothing is queued.
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Execute the work due at `now`. Returns the number of closures run.
    ///
    /// Only entries present when the tick began are considered, so a task
    /// that re-enqueues itself cannot starve the caller.
    pub fn tick_at(&self, now: Instant) -> usize {
        enum Front {
            /// Queue empty or gated on a delay that is not yet due.
            Blocked,
            /// A delay gate passed; keep going.
            GatePassed,
            /// A closure is ready to run.
            Task(TaskFn),
        }

        let mut budget = self.pending();
        let mut executed = 0;

        while budget > 0 {
            budget -= 1;

            let front = {
                let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
                let due = match entries.front_mut() {
                    None => None,
                    Some(QueueEntry::Delay { duration, deadline }) => {
                        let due = *deadline.get_or_insert(now + *duration);
                        Some(now >= due)
                    }
                    Some(QueueEntry::Run(_)) => Some(true),
                };
                match due {
                    None | Some(false) => Front::Blocked,
                    Some(true) => match entries.pop_front() {
                        Some(QueueEntry::Run(task)) => Front::Task(task),
                        _ => Front::GatePassed,
                    },
                }
            };

            match front {
                Front::Blocked => break,
                Front::GatePassed => continue,
                Front::Task(task) => {
                    task(now);
                    executed += 1;
                }
            }
        }

        executed
    }

    /// Execute the work due now. Returns the number of closures run.
    pub fn tick(&self) -> usize {
        self.tick_at(Instant::now())
    }
}
