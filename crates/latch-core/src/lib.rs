//! # Signals, Scopes, and Timers
//!
//! Latch hooks are built on a small single-threaded reactive core:
//!
//! - `Signal<T>`: observable value with `subscribe` / `unsubscribe`.
//! - `Scope` / `Dispose`: cleanups that run when an owner unmounts.
//! - `Composition` + `remember*`: state that survives across update cycles.
//! - `Timer` / `TimerQueue`: single-shot deferred callbacks over a `Clock`.
//! - `Epoch` / `CancelToken`: generation counting for stale-result checks.
//!
//! ## Signals
//!
//! ```rust
//! use latch_core::*;
//!
//! let count = signal(0);
//! count.set(1);
//! count.update(|v| *v += 1);
//! assert_eq!(count.get(), 2);
//! ```
//!
//! ## Remembered state
//!
//! A `Composition` owns remembered slots. Each `compose` call is one update
//! cycle; the Nth `remember` in a cycle refers to the Nth stored value.
//!
//! ```rust
//! use latch_core::*;
//!
//! let comp = Composition::new();
//! for _ in 0..3 {
//!     comp.compose(|| {
//!         let renders = remember_state(|| 0);
//!         *renders.borrow_mut() += 1;
//!     });
//! }
//! let total = comp.compose(|| {
//!     let renders = remember_state(|| 0);
//!     let n = *renders.borrow();
//!     n
//! });
//! assert_eq!(total, 3);
//! ```
//!
//! ## Effects and cleanup
//!
//! `scoped_effect` wires a cleanup to the current `Scope`, so it runs when the
//! composition is disposed:
//!
//! ```rust
//! use latch_core::*;
//!
//! let comp = Composition::new();
//! comp.compose(|| {
//!     scoped_effect(|| {
//!         log::info!("mounted");
//!         on_unmount(|| log::info!("unmounted"))
//!     });
//! });
//! comp.dispose();
//! ```
//!
//! ## Timers
//!
//! Nothing fires on its own: the loop that owns a `TimerQueue` calls
//! `run_due`. Tests drive it with a `ManualClock`.
//!
//! ```rust
//! use std::rc::Rc;
//! use latch_core::*;
//! use web_time::Duration;
//!
//! let clock = Rc::new(ManualClock::new());
//! let timers = TimerQueue::new(clock.clone());
//! let fired = signal(false);
//! let f = fired.clone();
//! timers.schedule(Duration::from_millis(10), Box::new(move || f.set(true)));
//! clock.advance(Duration::from_millis(10));
//! assert_eq!(timers.run_due(), 1);
//! assert!(fired.get());
//! ```

pub mod clock;
pub mod effects;
pub mod epoch;
pub mod prelude;
pub mod runtime;
pub mod scope;
pub mod signal;
pub mod timer;

pub use clock::*;
pub use effects::*;
pub use epoch::*;
pub use prelude::*;
pub use runtime::*;
pub use scope::*;
pub use signal::*;
pub use timer::*;
