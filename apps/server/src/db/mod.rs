//! Database layer - range stores and locked transactions

pub mod memory;
pub mod store;
pub mod traits;
pub mod transaction;

pub use memory::{InMemoryRangeStore, InMemoryRangeTransaction};
pub use store::PostgresRangeStore;
pub use traits::{InsertOutcome, RangeStore, RangeTransaction};
pub use transaction::{range_lock_key, PostgresRangeTransaction};
