use std::cell::RefCell;

/// Remembers the value seen one update cycle ago.
///
/// Values are moved in and handed back out, never deep-copied, so tracking
/// an `Rc` keeps its identity.
pub struct HistoryCell<T> {
    last: RefCell<Option<T>>,
}

impl<T> HistoryCell<T> {
    pub fn new() -> Self {
        Self {
            last: RefCell::new(None),
        }
    }

    /// Reports the value from the previous cycle, then records `current`.
    pub fn observe(&self, current: T) -> Option<T> {
        self.last.replace(Some(current))
    }

    /// What the next `observe` will report, without recording anything.
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.last.borrow().clone()
    }

    pub fn reset(&self) {
        self.last.borrow_mut().take();
    }
}

impl<T> Default for HistoryCell<T> {
    fn default() -> Self {
        Self::new()
    }
}
