use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Issue-order id of an asynchronous operation. Assigned when the operation
/// starts, never when it completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub const ZERO: Generation = Generation(0);

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic generation counter. Tokens taken from it stay valid only while
/// their generation is the latest one and the epoch is open.
pub struct Epoch(Rc<EpochInner>);

struct EpochInner {
    current: Cell<u64>,
    closed: Cell<bool>,
}

impl Epoch {
    pub fn new() -> Self {
        Self(Rc::new(EpochInner {
            current: Cell::new(0),
            closed: Cell::new(false),
        }))
    }

    /// Starts a new generation, invalidating every earlier token.
    pub fn advance(&self) -> CancelToken {
        let next = self.0.current.get() + 1;
        self.0.current.set(next);
        CancelToken {
            epoch: Rc::downgrade(&self.0),
            generation: Generation(next),
        }
    }

    pub fn current(&self) -> Generation {
        Generation(self.0.current.get())
    }

    /// Invalidates every outstanding token for good.
    pub fn close(&self) {
        self.0.closed.set(true);
        self.0.current.set(self.0.current.get() + 1);
    }

    pub fn is_closed(&self) -> bool {
        self.0.closed.get()
    }
}

impl Default for Epoch {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct CancelToken {
    epoch: Weak<EpochInner>,
    generation: Generation,
}

impl CancelToken {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Checked against the live counter, not a snapshot.
    pub fn is_current(&self) -> bool {
        match self.epoch.upgrade() {
            Some(e) => !e.closed.get() && e.current.get() == self.generation.0,
            None => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        !self.is_current()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("generation", &self.generation)
            .field("current", &self.is_current())
            .finish()
    }
}
