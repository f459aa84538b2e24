use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::scope::Scope;
use crate::signal::{Signal, SubId, signal};

thread_local! {
    static CURRENT_COMPOSER: RefCell<Option<Rc<RefCell<Composer>>>> = const { RefCell::new(None) };
    static CURRENT_INVALIDATOR: RefCell<Option<Invalidator>> = const { RefCell::new(None) };
}

/// Remembered slots of one composition.
#[derive(Default)]
pub struct Composer {
    pub slots: Vec<Box<dyn Any>>,
    pub cursor: usize,
    pub keyed_slots: HashMap<String, Box<dyn Any>>,
}

/// A mounted owner of remembered state. Each call to [`Composition::compose`]
/// is one update cycle; [`Composition::dispose`] unmounts it.
pub struct Composition {
    composer: Rc<RefCell<Composer>>,
    scope: Scope,
    cycles: Cell<u64>,
    invalidations: Signal<u64>,
}

/// Asks the owning composition for another update cycle.
#[derive(Clone)]
pub struct Invalidator(Signal<u64>);

impl Invalidator {
    pub fn invalidate(&self) {
        self.0.update(|n| *n = n.wrapping_add(1));
    }
}

/// The invalidator of the composition currently composing, if any.
pub fn invalidator() -> Option<Invalidator> {
    CURRENT_INVALIDATOR.with(|c| c.borrow().clone())
}

impl Composition {
    pub fn new() -> Self {
        Self {
            composer: Rc::new(RefCell::new(Composer::default())),
            scope: Scope::new(),
            cycles: Cell::new(0),
            invalidations: signal(0),
        }
    }

    /// Runs one update cycle. Slot-based `remember` calls resolve in call order.
    pub fn compose<R>(&self, build: impl FnOnce() -> R) -> R {
        if self.scope.is_disposed() {
            log::warn!("compose: composition already disposed; remembered state is gone");
        }
        self.composer.borrow_mut().cursor = 0;
        let prev = CURRENT_COMPOSER.with(|c| c.borrow_mut().replace(self.composer.clone()));
        let prev_inv = CURRENT_INVALIDATOR.with(|c| {
            c.borrow_mut()
                .replace(Invalidator(self.invalidations.clone()))
        });
        let out = self.scope.run(build);
        CURRENT_INVALIDATOR.with(|c| *c.borrow_mut() = prev_inv);
        CURRENT_COMPOSER.with(|c| *c.borrow_mut() = prev);
        self.cycles.set(self.cycles.get() + 1);
        out
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.get()
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Called whenever remembered state asks for another cycle. Callbacks
    /// should schedule a recompose rather than run one inline.
    pub fn on_invalidate(&self, f: impl Fn(u64) + 'static) -> SubId {
        self.invalidations.subscribe(move |n| f(*n))
    }

    pub fn invalidation_count(&self) -> u64 {
        self.invalidations.get()
    }

    /// Runs every scoped cleanup, then drops remembered slots.
    pub fn dispose(&self) {
        self.scope.dispose();
        let (slots, keyed) = {
            let mut c = self.composer.borrow_mut();
            c.cursor = 0;
            (
                std::mem::take(&mut c.slots),
                std::mem::take(&mut c.keyed_slots),
            )
        };
        // slot values may run their own Drop logic; release the borrow first
        drop(slots);
        drop(keyed);
    }
}

impl Default for Composition {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Composition {
    fn drop(&mut self) {
        if !self.scope.is_disposed() {
            self.dispose();
        }
    }
}

fn with_composer<R>(f: impl FnOnce(Option<&mut Composer>) -> R) -> R {
    let current = CURRENT_COMPOSER.with(|c| c.borrow().clone());
    match current {
        Some(composer) => {
            let mut c = composer.borrow_mut();
            f(Some(&mut *c))
        }
        None => f(None),
    }
}

/// Slot-based remember (sequential composition only)
pub fn remember<T: 'static>(init: impl FnOnce() -> T) -> Rc<T> {
    let existing = with_composer(|c| {
        let Some(c) = c else {
            log::warn!("remember: called outside a composition; value will not persist");
            return None;
        };
        let cursor = c.cursor;
        c.cursor += 1;
        match c.slots.get(cursor) {
            None => {
                // reserve the slot so nested remembers inside init land after it
                c.slots.push(Box::new(()));
                Some((cursor, None))
            }
            Some(slot) => match slot.downcast_ref::<Rc<T>>() {
                Some(rc) => Some((cursor, Some(rc.clone()))),
                None => {
                    log::warn!(
                        "remember: slot {} type changed; replacing. \
                         If this is due to conditional composition, prefer remember_with_key.",
                        cursor
                    );
                    Some((cursor, None))
                }
            },
        }
    });

    match existing {
        Some((_, Some(rc))) => rc,
        Some((cursor, None)) => {
            // init may itself remember, so the composer is not borrowed here
            let rc: Rc<T> = Rc::new(init());
            with_composer(|c| {
                if let Some(slot) = c.and_then(|c| c.slots.get_mut(cursor)) {
                    *slot = Box::new(rc.clone());
                }
            });
            rc
        }
        None => Rc::new(init()),
    }
}

/// Key-based remember
pub fn remember_with_key<T: 'static>(key: impl Into<String>, init: impl FnOnce() -> T) -> Rc<T> {
    let key = key.into();
    let existing = with_composer(|c| {
        let Some(c) = c else {
            log::warn!("remember_with_key: '{key}' used outside a composition");
            return None;
        };
        match c.keyed_slots.get(&key) {
            Some(existing) => match existing.downcast_ref::<Rc<T>>() {
                Some(rc) => Some(Some(rc.clone())),
                None => {
                    log::warn!(
                        "remember_with_key: key '{}' reused with a different type; replacing.",
                        key
                    );
                    Some(None)
                }
            },
            None => Some(None),
        }
    });

    match existing {
        Some(Some(rc)) => rc,
        Some(None) => {
            let rc: Rc<T> = Rc::new(init());
            with_composer(|c| {
                if let Some(c) = c {
                    c.keyed_slots.insert(key, Box::new(rc.clone()));
                }
            });
            rc
        }
        None => Rc::new(init()),
    }
}

pub fn remember_state<T: 'static>(init: impl FnOnce() -> T) -> Rc<RefCell<T>> {
    remember(|| RefCell::new(init()))
}
