//! Polar AccessLink exercise transactions.
//!
//! AccessLink hands out exercise data through "transactions": a window is
//! opened, its exercise locators are listed and fetched, and the window is
//! committed so the provider can open the next one. A fresh window is only
//! allocated once the previous one has been committed (or after a ten minute
//! timeout), so all acquisition for one credential pair goes through a single
//! [`TransactionSession`].

pub mod api;
pub mod models;
pub mod session;
pub mod transaction;

#[cfg(test)]
pub(crate) mod mock;

pub use api::{AccessLinkApi, Fetched, HttpAccessLink};
pub use models::ExerciseRecord;
pub use session::{SessionKey, SessionRegistry, SessionState, SharedSession, TransactionSession};
pub use transaction::{FetchedExercise, RecordStream, Transaction, TransactionClient};

/// Default ceiling on transactions opened by one session.
pub const DEFAULT_RETRY_LIMIT: u32 = 10;
