//! Read-path duplicate collapsing and display ordering.
//!
//! Stored rows that agree on every column of the uniqueness contract are
//! collapsed to one representative (the lowest id). This runs on every listing
//! regardless of write-time prevention, since older data may predate it.

use std::collections::HashMap;

use crate::age::cmp_end;
use crate::model::{DedupKey, ParameterId, RangeId, StoredRange};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deduplicated {
    /// One representative per distinct key.
    pub kept: Vec<StoredRange>,
    /// Every other row, paired with the id of the representative it duplicates.
    pub duplicates: Vec<(StoredRange, RangeId)>,
}

pub fn partition_duplicates(mut rows: Vec<StoredRange>) -> Deduplicated {
    rows.sort_by_key(|row| row.id);

    let mut seen: HashMap<(ParameterId, DedupKey), RangeId> = HashMap::with_capacity(rows.len());
    let mut out = Deduplicated::default();
    for row in rows {
        let key = (row.parameter_id, row.content.dedup_key());
        match seen.get(&key) {
            Some(&representative) => out.duplicates.push((row, representative)),
            None => {
                seen.insert(key, row.id);
                out.kept.push(row);
            }
        }
    }
    out
}

/// Collapse duplicates and order rows for display.
pub fn dedup_sorted(rows: Vec<StoredRange>) -> Vec<StoredRange> {
    let mut kept = partition_duplicates(rows).kept;
    sort_for_display(&mut kept);
    kept
}

/// Age ascending (open ends last), then sex, then id.
pub fn sort_for_display(rows: &mut [StoredRange]) {
    rows.sort_by(|a, b| {
        a.parameter_id
            .cmp(&b.parameter_id)
            .then_with(|| {
                a.content
                    .interval()
                    .start_years()
                    .cmp(&b.content.interval().start_years())
            })
            .then_with(|| {
                cmp_end(
                    a.content.interval().end_years(),
                    b.content.interval().end_years(),
                )
            })
            .then_with(|| a.content.sex.cmp(&b.content.sex))
            .then_with(|| a.id.cmp(&b.id))
    });
}
