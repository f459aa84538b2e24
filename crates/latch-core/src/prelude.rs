pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::effects::{Dispose, on_unmount};
pub use crate::epoch::{CancelToken, Epoch, Generation};
pub use crate::runtime::{
    Composition, Invalidator, invalidator, remember, remember_state, remember_with_key,
};
pub use crate::scope::{Scope, current_scope, scoped_effect};
pub use crate::signal::{Signal, SubId, signal};
pub use crate::timer::{Timer, TimerId, TimerQueue};
