//! Per-operation timing statistics.
//!
//! Every intercepted operation reports `(operation_name, duration)` into a
//! [`StatsTable`], a fixed-capacity open-addressing hash table keyed by the
//! operation name. Timing itself goes through the injected [`Clock`].

pub mod clock;
pub mod error;
pub mod hash;
pub mod overhead;
pub mod shared;
pub mod table;

pub use clock::{Clock, ManualClock, OpTimer, SystemClock};
pub use error::{Result, StatsError};
pub use overhead::{Overhead, OverheadList};
pub use shared::SharedStats;
pub use table::{Iter, StatsEntry, StatsTable};
