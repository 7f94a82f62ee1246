//! Core traits for reference-range storage backends

use crate::{models::ParameterRecord, Result};
use async_trait::async_trait;
use labsync_ranges::{ParameterId, RangeContent, RangeId, StoredRange};
use std::time::Duration;

/// Storage for parameters and their reference ranges.
///
/// Reads go straight to the backend. All writes go through a
/// [`RangeTransaction`] obtained from [`RangeStore::begin_locked`], which holds
/// the parameter's exclusive guard until it commits or rolls back.
#[async_trait]
pub trait RangeStore: Send + Sync + Clone + 'static {
    type Transaction: RangeTransaction;

    /// Cheap liveness check for `/health`.
    async fn ping(&self) -> Result<()>;

    async fn get_parameter(&self, parameter_id: ParameterId) -> Result<Option<ParameterRecord>>;

    /// Parameters of a study ordered by position.
    async fn list_study_parameters(&self, study_id: i64) -> Result<Vec<ParameterRecord>>;

    /// Raw stored rows of one parameter, duplicates included.
    async fn list_ranges(&self, parameter_id: ParameterId) -> Result<Vec<StoredRange>>;

    /// Raw stored rows of several parameters in one round trip.
    async fn list_ranges_for(&self, parameter_ids: &[ParameterId]) -> Result<Vec<StoredRange>>;

    /// Every stored row, for the table-wide audit.
    async fn list_all_ranges(&self) -> Result<Vec<StoredRange>>;

    /// Open a transaction holding the exclusive guard of `parameter_id`.
    ///
    /// # Errors
    /// * `ParameterNotFound` - the parameter does not exist
    /// * `SyncLockTimeout` - the guard was not acquired within `lock_timeout`
    async fn begin_locked(
        &self,
        parameter_id: ParameterId,
        lock_timeout: Duration,
    ) -> Result<Self::Transaction>;
}

/// Outcome of inserting one range row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(RangeId),
    /// A content-identical row already existed; nothing was written.
    AlreadyPresent(RangeId),
}

/// Write scope over one parameter's ranges. Dropping it without `commit`
/// discards every change.
#[async_trait]
pub trait RangeTransaction: Send {
    fn parameter_id(&self) -> ParameterId;

    /// Stored rows of the parameter as seen inside this transaction.
    async fn load_ranges(&mut self) -> Result<Vec<StoredRange>>;

    async fn delete_ranges(&mut self, ids: &[RangeId]) -> Result<u64>;

    async fn update_range(&mut self, id: RangeId, content: &RangeContent) -> Result<()>;

    /// Insert a row unless a row with the same content key exists.
    ///
    /// # Errors
    /// * `StoredOverlap` - an existing row shares the key but differs in content
    async fn insert_range(&mut self, content: &RangeContent) -> Result<InsertOutcome>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}
