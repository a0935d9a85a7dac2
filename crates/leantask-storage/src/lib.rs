//! Two-database persistent store (spec.md §4.1).
//!
//! `Store` owns two SQLite pools rooted at `<project>/.leantask/`:
//! `operational.db` holds the current entities, `log.db` mirrors every
//! write with a synthetic id and timestamp (spec.md §3 `LogRecord(X)`).

mod log;
mod models;
mod operational;
mod store;

pub use models::*;
pub use store::Store;
