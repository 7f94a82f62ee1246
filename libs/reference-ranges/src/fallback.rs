//! Synthetic "no reference established" rows.
//!
//! A touched sex group that ends up with no real rows, while the client sent
//! at least one valueless entry for it, is represented by a single fallback
//! row. When the whole parameter has no real rows left, every remaining row
//! collapses into one `Ambos` fallback.

use std::collections::{BTreeMap, BTreeSet};

use crate::gap_fill::RealIntervals;
use crate::model::{RangeContent, RowKind, Sex, StoredRange};
use crate::plan::{Decision, DeleteReason, Draft, InsertOrigin};

pub(crate) fn settle_groups(
    draft: &mut Draft<'_>,
    real: &RealIntervals,
    candidates: &BTreeSet<Sex>,
    mut pooled: BTreeMap<Sex, Vec<&StoredRange>>,
) {
    let touched: Vec<Sex> = draft.touched.iter().copied().collect();
    for sex in touched {
        let rows = pooled.remove(&sex).unwrap_or_default();
        let has_real = real.get(&sex).is_some_and(|intervals| !intervals.is_empty());

        if has_real || !candidates.contains(&sex) {
            for row in rows {
                draft.set(row.id, Decision::Delete(DeleteReason::Replaced));
            }
            continue;
        }

        let wanted = RangeContent::fallback(sex);
        let mut rows = rows.into_iter();
        match rows.next() {
            Some(first) if first.content == wanted => {}
            Some(first) => draft.set(first.id, Decision::Update(wanted)),
            None => draft.inserts.push((InsertOrigin::Fallback, wanted)),
        }
        for extra in rows {
            draft.set(extra.id, Decision::Delete(DeleteReason::Collapsed));
        }
        draft.fallback_applied = true;
    }
}

/// Collapse a parameter left without real rows into a single `Ambos` fallback.
///
/// Only applies when a fallback row survived the group pass; a parameter that
/// is simply empty stays empty.
pub(crate) fn collapse_parameter(draft: &mut Draft<'_>) {
    let finals = draft.final_rows();
    if finals.iter().any(|c| c.is_real()) {
        return;
    }
    if !finals.iter().any(|c| c.kind() == RowKind::Fallback) {
        return;
    }

    let target = RangeContent::fallback(Sex::Ambos);
    let reuse = draft
        .existing
        .rows
        .iter()
        .find(|row| row.content == target)
        .map(|row| row.id);

    let survivors: Vec<_> = draft
        .decisions
        .keys()
        .copied()
        .filter(|&id| Some(id) != reuse && draft.final_content(id).is_some())
        .collect();
    for id in survivors {
        draft.set(id, Decision::Delete(DeleteReason::Collapsed));
    }

    draft.inserts.clear();
    match reuse {
        Some(id) => draft.set(id, Decision::Keep),
        None => draft.inserts.push((InsertOrigin::Fallback, target)),
    }
    draft.fallback_applied = true;
}
