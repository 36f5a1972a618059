//! Persistent state.
//!
//! - [`TrackedImageStore`]: the tracked-image table (`<data>/tagwatch.db`,
//!   or in memory), one row per `(image, tag)`.
//! - [`SystemStateFile`]: process-scoped flags (first run, pending
//!   self-update) in `<data>/state.json`.
//!
//! Both are owned by the reconciliation loop and never shared between
//! concurrent tasks.

mod sqlite;
mod system;
mod types;

pub use sqlite::TrackedImageStore;
pub use system::{SystemState, SystemStateFile};
pub use types::{Decision, TrackedImage, UpdatedKind, WatchEntry};
