use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use latch_core::{CancelToken, Epoch, Signal, SubId, Timer, TimerId, signal};
use web_time::Duration;

/// Exposes the latest value only after `interval` passes with no new update.
///
/// Every [`update`](Debouncer::update) cancels the pending commit and schedules
/// a fresh one; values superseded inside the quiet window are never committed.
pub struct Debouncer<T: 'static> {
    inner: Rc<Inner<T>>,
}

struct Inner<T: 'static> {
    timer: Rc<dyn Timer>,
    interval: Cell<Duration>,
    committed: Signal<T>,
    pending: RefCell<Option<T>>,
    scheduled: Cell<Option<TimerId>>,
    epoch: Epoch,
}

impl<T> Clone for Debouncer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Debouncer<T> {
    pub fn new(timer: Rc<dyn Timer>, initial: T, interval: Duration) -> Self {
        Self {
            inner: Rc::new(Inner {
                timer,
                interval: Cell::new(interval),
                committed: signal(initial),
                pending: RefCell::new(None),
                scheduled: Cell::new(None),
                epoch: Epoch::new(),
            }),
        }
    }

    pub fn update(&self, value: T) {
        if self.inner.epoch.is_closed() {
            log::debug!("debounce: update after dispose ignored");
            return;
        }
        *self.inner.pending.borrow_mut() = Some(value);
        self.reschedule();
    }

    pub fn committed(&self) -> T
    where
        T: Clone,
    {
        self.inner.committed.get()
    }

    pub fn with_committed<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.committed.with(f)
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending.borrow().is_some()
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval.get()
    }

    /// Takes effect immediately: a pending commit is rescheduled with the new
    /// interval, counted from now.
    pub fn set_interval(&self, interval: Duration) {
        if self.inner.interval.replace(interval) == interval {
            return;
        }
        if self.is_pending() && !self.inner.epoch.is_closed() {
            self.reschedule();
        }
    }

    /// Commits the pending value now, if there is one.
    pub fn flush(&self) {
        self.inner.cancel_scheduled();
        self.inner.epoch.advance();
        self.inner.commit();
    }

    /// Drops the pending value without committing it.
    pub fn cancel(&self) {
        self.inner.cancel_scheduled();
        self.inner.epoch.advance();
        self.inner.pending.borrow_mut().take();
    }

    /// Cancels any pending commit for good; later updates are ignored.
    pub fn dispose(&self) {
        self.inner.cancel_scheduled();
        self.inner.epoch.close();
        self.inner.pending.borrow_mut().take();
    }

    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> SubId {
        self.inner.committed.subscribe(f)
    }

    pub fn unsubscribe(&self, id: SubId) -> bool {
        self.inner.committed.unsubscribe(id)
    }

    fn reschedule(&self) {
        self.inner.cancel_scheduled();
        let token = self.inner.epoch.advance();
        let weak: Weak<Inner<T>> = Rc::downgrade(&self.inner);
        let id = self.inner.timer.schedule(
            self.inner.interval.get(),
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.fire(&token);
                }
            }),
        );
        self.inner.scheduled.set(Some(id));
    }
}

impl<T: 'static> Inner<T> {
    fn cancel_scheduled(&self) {
        if let Some(id) = self.scheduled.take() {
            self.timer.cancel(id);
        }
    }

    fn fire(&self, token: &CancelToken) {
        // a timer that could not be cancelled in time still lands here
        if !token.is_current() {
            log::trace!("debounce: superseded timer {} ignored", token.generation());
            return;
        }
        self.scheduled.set(None);
        self.commit();
    }

    fn commit(&self) {
        let value = self.pending.borrow_mut().take();
        if let Some(value) = value {
            log::trace!("debounce: commit");
            self.committed.set(value);
        }
    }
}

impl<T: 'static> Drop for Inner<T> {
    fn drop(&mut self) {
        self.cancel_scheduled();
    }
}
