use std::cell::{Cell, RefCell};
use std::rc::Rc;

use smallvec::SmallVec;

pub type SubId = usize;

type Subscriber<T> = Rc<dyn Fn(&T)>;
type QueuedWrite<T> = Box<dyn FnOnce(&mut T)>;

/// Observable value. Cloning the handle shares the value and its subscribers.
///
/// Subscribers may write back into the signal they observe. Such writes are
/// queued and applied once every subscriber has seen the current value, then
/// announced in a further pass.
pub struct Signal<T: 'static>(Rc<Inner<T>>);

struct Inner<T> {
    value: RefCell<T>,
    subs: RefCell<SmallVec<[(SubId, Subscriber<T>); 4]>>,
    next_sub: Cell<SubId>,
    notifying: Cell<bool>,
    queued: RefCell<Vec<QueuedWrite<T>>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Signal<T> {
    pub fn new(value: T) -> Self {
        Self(Rc::new(Inner {
            value: RefCell::new(value),
            subs: RefCell::new(SmallVec::new()),
            next_sub: Cell::new(0),
            notifying: Cell::new(false),
            queued: RefCell::new(Vec::new()),
        }))
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.0.value.borrow().clone()
    }

    /// Borrow the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.0.value.borrow())
    }

    pub fn set(&self, v: T) {
        self.update(move |slot| *slot = v);
    }

    pub fn update<F: FnOnce(&mut T) + 'static>(&self, f: F) {
        if self.0.notifying.get() {
            self.0.queued.borrow_mut().push(Box::new(f));
            return;
        }
        f(&mut self.0.value.borrow_mut());
        self.notify();
    }

    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> SubId {
        let id = self.0.next_sub.get();
        self.0.next_sub.set(id + 1);
        let sub: Subscriber<T> = Rc::new(f);
        self.0.subs.borrow_mut().push((id, sub));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubId) -> bool {
        let mut subs = self.0.subs.borrow_mut();
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        subs.len() != before
    }

    /// Identity comparison of two handles.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn notify(&self) {
        loop {
            let subs: SmallVec<[Subscriber<T>; 4]> =
                self.0.subs.borrow().iter().map(|(_, s)| s.clone()).collect();
            if subs.is_empty() {
                return;
            }
            {
                let _pass = NotifyPass::enter(&self.0.notifying);
                let value = self.0.value.borrow();
                for s in subs {
                    s(&value);
                }
            }

            let queued = std::mem::take(&mut *self.0.queued.borrow_mut());
            if queued.is_empty() {
                return;
            }
            let mut value = self.0.value.borrow_mut();
            for write in queued {
                write(&mut value);
            }
        }
    }
}

// Clears the flag even if a subscriber unwinds.
struct NotifyPass<'a>(&'a Cell<bool>);

impl<'a> NotifyPass<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for NotifyPass<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

pub fn signal<T>(t: T) -> Signal<T> {
    Signal::new(t)
}
