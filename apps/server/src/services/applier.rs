//! Persistence applier: writes a [`SyncPlan`] through a locked transaction.

use labsync_ranges::SyncPlan;

use crate::{
    db::{InsertOutcome, RangeTransaction},
    metrics::RANGE_ROWS_WRITTEN_TOTAL,
    Result,
};

/// Rows actually touched by [`apply_plan`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedCounts {
    pub deleted: u64,
    pub updated: u64,
    pub inserted: u64,
    /// Inserts skipped because an identical row was already stored.
    pub skipped: u64,
}

impl AppliedCounts {
    pub fn record_metrics(&self) {
        RANGE_ROWS_WRITTEN_TOTAL
            .with_label_values(&["delete"])
            .inc_by(self.deleted);
        RANGE_ROWS_WRITTEN_TOTAL
            .with_label_values(&["update"])
            .inc_by(self.updated);
        RANGE_ROWS_WRITTEN_TOTAL
            .with_label_values(&["insert"])
            .inc_by(self.inserted);
    }
}

/// Apply deletes, then updates, then inserts.
///
/// Deleting first frees content keys that updated or inserted rows may take
/// over. The caller owns the transaction and decides whether to commit; on
/// error nothing here has been made visible.
pub async fn apply_plan<T: RangeTransaction>(tx: &mut T, plan: &SyncPlan) -> Result<AppliedCounts> {
    let mut counts = AppliedCounts::default();

    if !plan.deletes.is_empty() {
        counts.deleted = tx.delete_ranges(&plan.deletes).await?;
        if counts.deleted != plan.deletes.len() as u64 {
            tracing::warn!(
                parameter_id = tx.parameter_id(),
                planned = plan.deletes.len(),
                deleted = counts.deleted,
                "Fewer reference ranges deleted than planned"
            );
        }
    }

    for update in &plan.updates {
        tx.update_range(update.id, &update.content).await?;
        counts.updated += 1;
    }

    for content in &plan.inserts {
        match tx.insert_range(content).await? {
            InsertOutcome::Inserted(_) => counts.inserted += 1,
            InsertOutcome::AlreadyPresent(id) => {
                tracing::debug!(
                    parameter_id = tx.parameter_id(),
                    existing_id = id,
                    "Skipped insert of a reference range that is already stored"
                );
                counts.skipped += 1;
            }
        }
    }

    Ok(counts)
}
