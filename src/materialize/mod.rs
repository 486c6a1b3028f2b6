//! Turning fetched exercises into table rows.

pub mod exercise;
pub mod trace;

pub use exercise::{sync_exercises, ExerciseMaterializer, ExerciseSyncReport};
pub use trace::{parse_trace, TracePoint};
