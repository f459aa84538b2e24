//! # Hooks
//!
//! Four independent stateful utilities, each observable through a
//! `subscribe` callback instead of a render loop:
//!
//! - [`RequestCoordinator`]: fetches JSON and lets only the most recently
//!   issued request update `{ data, error, loading }`.
//! - [`Debouncer`]: commits the latest value once updates stop for a quiet
//!   interval.
//! - [`PersistentCell`]: a value mirrored into a [`KeyValueStore`], falling
//!   back to a default when the stored entry is missing or unreadable.
//! - [`HistoryCell`]: the value seen one update cycle ago.
//!
//! The `remember_*` functions in [`compose`] bind them to a
//! [`latch_core::Composition`].
//!
//! ```rust
//! use std::rc::Rc;
//! use latch_core::{ManualClock, TimerQueue};
//! use latch_hooks::Debouncer;
//! use web_time::Duration;
//!
//! let clock = Rc::new(ManualClock::new());
//! let timers = Rc::new(TimerQueue::new(clock.clone()));
//! let search = Debouncer::new(timers.clone(), String::new(), Duration::from_millis(300));
//!
//! for text in ["r", "ru", "rust"] {
//!     search.update(text.to_string());
//! }
//! clock.advance(Duration::from_millis(300));
//! timers.run_due();
//! assert_eq!(search.committed(), "rust");
//! ```

pub mod compose;
pub mod debounce;
pub mod fetch;
#[cfg(feature = "http")]
pub mod http;
pub mod persist;
pub mod previous;
pub mod store;
pub mod transport;

pub use compose::{
    FetchHandle, remember_debounced, remember_fetch, remember_persisted, remember_previous,
};
pub use debounce::Debouncer;
pub use fetch::{FetchError, FetchOptions, FetchState, FetchTarget, RequestCoordinator};
#[cfg(feature = "http")]
pub use http::UreqTransport;
pub use persist::{PersistentCell, SetValue, Setter};
pub use previous::HistoryCell;
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use transport::{
    HttpRequest, HttpResponse, Method, ScriptedTransport, Transport, TransportError,
};
