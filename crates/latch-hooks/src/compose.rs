//! Hook-style wrappers that bind each utility to the current [`Composition`].
//!
//! Each wrapper keeps its utility in a remembered slot, asks the composition
//! for another cycle when the utility's observable state changes, and tears
//! the utility down when the composition is disposed.
//!
//! [`Composition`]: latch_core::Composition

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use latch_core::{Generation, Timer, invalidator, on_unmount, remember, scoped_effect};
use serde::Serialize;
use serde::de::DeserializeOwned;
use web_time::Duration;

use crate::debounce::Debouncer;
use crate::fetch::{FetchError, FetchTarget, RequestCoordinator};
use crate::persist::{PersistentCell, Setter};
use crate::previous::HistoryCell;
use crate::store::KeyValueStore;
use crate::transport::Transport;

/// Snapshot of a fetch for one cycle, plus a way to re-issue it.
pub struct FetchHandle<T: 'static> {
    pub data: Option<T>,
    pub error: Option<FetchError>,
    pub loading: bool,
    coordinator: RequestCoordinator<T>,
}

impl<T: DeserializeOwned + 'static> FetchHandle<T> {
    pub fn refetch(&self) -> Option<Generation> {
        self.coordinator.refetch()
    }

    pub fn coordinator(&self) -> &RequestCoordinator<T> {
        &self.coordinator
    }
}

/// Fetches `target`, re-issuing whenever it differs from the last cycle's.
pub fn remember_fetch<T>(
    target: impl Into<FetchTarget>,
    transport: &Rc<dyn Transport>,
) -> FetchHandle<T>
where
    T: DeserializeOwned + Clone + 'static,
{
    let coordinator = remember(|| {
        let c = RequestCoordinator::<T>::new(transport.clone());
        if let Some(inv) = invalidator() {
            c.subscribe(move |_| inv.invalidate());
        }
        let owned = c.clone();
        scoped_effect(move || on_unmount(move || owned.dispose()));
        c
    });

    coordinator.set_target(target);
    let state = coordinator.state();
    FetchHandle {
        data: state.data,
        error: state.error,
        loading: state.loading,
        coordinator: (*coordinator).clone(),
    }
}

/// Returns `value` once it has stayed unchanged for `interval`.
pub fn remember_debounced<T>(value: T, interval: Duration, timer: &Rc<dyn Timer>) -> T
where
    T: Clone + PartialEq + 'static,
{
    let debouncer = remember(|| {
        let d = Debouncer::new(timer.clone(), value.clone(), interval);
        if let Some(inv) = invalidator() {
            d.subscribe(move |_| inv.invalidate());
        }
        let owned = d.clone();
        scoped_effect(move || on_unmount(move || owned.dispose()));
        d
    });
    let last_seen = remember(|| RefCell::new(value.clone()));

    debouncer.set_interval(interval);
    if *last_seen.borrow() != value {
        *last_seen.borrow_mut() = value.clone();
        debouncer.update(value);
    }
    debouncer.committed()
}

/// Value persisted under `key`, plus its setter. A new `key` re-reads.
pub fn remember_persisted<T>(
    key: &str,
    default: impl FnOnce() -> T,
    store: &Arc<dyn KeyValueStore>,
) -> (T, Setter<T>)
where
    T: Serialize + DeserializeOwned + Clone + 'static,
{
    let cell = remember(|| {
        let c = PersistentCell::new(store.clone(), key, default());
        if let Some(inv) = invalidator() {
            c.subscribe(move |_| inv.invalidate());
        }
        c
    });
    cell.rebind(key);
    (cell.get(), cell.setter())
}

/// The value passed in the previous cycle; `None` on the first.
pub fn remember_previous<T: 'static>(value: T) -> Option<T> {
    remember(HistoryCell::<T>::new).observe(value)
}
