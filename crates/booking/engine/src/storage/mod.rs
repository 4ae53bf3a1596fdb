//! Persistence for workflow runs and the externally owned booking entity
//!
//! Every status write is conditional on the status the writer last saw.
//! There is no global lock: three actors (a human action, a timer-driven
//! transition, a cancellation) can race on the same booking, and per-record
//! compare-and-swap decides the winner.

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
pub use traits::{BookingStore, RunStore, WriteOutcome};
