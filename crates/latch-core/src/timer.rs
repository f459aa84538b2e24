use std::cell::{Cell, RefCell};
use std::rc::Rc;

use slotmap::{SlotMap, new_key_type};
use web_time::{Duration, Instant};

use crate::clock::Clock;

new_key_type! {
    /// Handle to a scheduled callback. Stale handles never alias a newer timer.
    pub struct TimerId;
}

/// Single-shot deferred callbacks.
pub trait Timer {
    fn schedule(&self, delay: Duration, f: Box<dyn FnOnce()>) -> TimerId;
    /// Returns false if the timer already fired or was cancelled.
    fn cancel(&self, id: TimerId) -> bool;
}

impl<T: Timer + ?Sized> Timer for Rc<T> {
    fn schedule(&self, delay: Duration, f: Box<dyn FnOnce()>) -> TimerId {
        (**self).schedule(delay, f)
    }
    fn cancel(&self, id: TimerId) -> bool {
        (**self).cancel(id)
    }
}

struct Pending {
    deadline: Instant,
    seq: u64,
    callback: Box<dyn FnOnce()>,
}

/// Timer queue for a single-threaded loop. Nothing fires until the owner
/// calls [`TimerQueue::run_due`].
pub struct TimerQueue {
    clock: Rc<dyn Clock>,
    pending: RefCell<SlotMap<TimerId, Pending>>,
    next_seq: Cell<u64>,
}

impl TimerQueue {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            pending: RefCell::new(SlotMap::with_key()),
            next_seq: Cell::new(0),
        }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.pending.borrow().contains_key(id)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.borrow().values().map(|p| p.deadline).min()
    }

    /// Fires every callback whose deadline has passed, earliest first, ties in
    /// scheduling order. Callbacks may schedule or cancel timers; ones that
    /// become due while draining also fire. Returns how many fired.
    pub fn run_due(&self) -> usize {
        let mut fired = 0;
        loop {
            let now = self.clock.now();
            let due = {
                let pending = self.pending.borrow();
                pending
                    .iter()
                    .filter(|(_, p)| p.deadline <= now)
                    .min_by_key(|(_, p)| (p.deadline, p.seq))
                    .map(|(id, _)| id)
            };
            let Some(id) = due else { break };
            let Some(entry) = self.pending.borrow_mut().remove(id) else {
                break;
            };
            log::trace!("timer {:?} fired", id);
            (entry.callback)();
            fired += 1;
        }
        fired
    }
}

impl Timer for TimerQueue {
    fn schedule(&self, delay: Duration, f: Box<dyn FnOnce()>) -> TimerId {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        let deadline = self.clock.now() + delay;
        self.pending.borrow_mut().insert(Pending {
            deadline,
            seq,
            callback: f,
        })
    }

    fn cancel(&self, id: TimerId) -> bool {
        let removed = self.pending.borrow_mut().remove(id);
        removed.is_some()
    }
}
