//! Scheduler engine and run executor (spec.md §4.2, §4.3): the supervisor
//! loop that keeps the Store's schedules and runs in sync with flow
//! scripts on disk and wall-clock time, and the per-run subprocess
//! launcher it hands due runs to.

pub mod admission;
pub mod context;
pub mod engine;
pub mod executor;
pub mod pool;

pub use admission::{check_admission, Admission};
pub use context::Context;
pub use engine::{place_manual_schedule, place_next_schedule, start, tick};
pub use pool::WorkerPool;
