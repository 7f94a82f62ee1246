//! Diff/merge planning between a submitted range set and the stored one.
//!
//! The planner never touches storage. It reads a snapshot of the stored rows
//! ([`ExistingState`]) and produces a [`SyncPlan`]: the deletes, updates and
//! inserts that turn the snapshot into the desired state.
//!
//! Policy:
//! - sex groups not mentioned by the payload are left alone;
//! - incoming real descriptors pair with stored rows by id, then by
//!   `(sex, age_min, age_max)`; paired rows are updated only when content differs;
//! - unpaired stored rows of a touched group are deleted, except placeholders
//!   and fallback rows, which gap filling and fallback collapsing reconsider.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::dedup::partition_duplicates;
use crate::gap_fill::{self, RealIntervals};
use crate::model::{RangeContent, RangeId, RowKind, Sex, StoredRange};
use crate::normalize::{DescriptorRole, NormalizedDescriptor};
use crate::sync::{PreparedSync, SyncIntent};
use crate::fallback;

/// Upper end of the age span that gap filling covers, in years.
pub const DEFAULT_MAX_AGE_YEARS: u32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOptions {
    pub max_age_years: Decimal,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            max_age_years: Decimal::from(DEFAULT_MAX_AGE_YEARS),
        }
    }
}

/// Stored rows of one parameter as seen by the planner, with exact
/// duplicates split off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingState {
    pub rows: Vec<StoredRange>,
    pub duplicates: Vec<StoredRange>,
}

impl ExistingState {
    pub fn from_rows(rows: Vec<StoredRange>) -> Self {
        let split = partition_duplicates(rows);
        Self {
            rows: split.kept,
            duplicates: split.duplicates.into_iter().map(|(row, _)| row).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len() + self.duplicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn all_rows(&self) -> impl Iterator<Item = &StoredRange> {
        self.rows.iter().chain(self.duplicates.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeUpdate {
    pub id: RangeId,
    pub content: RangeContent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub touched: Vec<Sex>,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub kept: usize,
    pub placeholders_inserted: usize,
    pub placeholders_absorbed: usize,
    pub duplicates_removed: usize,
    pub fallback_applied: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPlan {
    pub deletes: Vec<RangeId>,
    pub updates: Vec<RangeUpdate>,
    pub inserts: Vec<RangeContent>,
    pub summary: PlanSummary,
}

impl SyncPlan {
    pub fn is_noop(&self) -> bool {
        self.deletes.is_empty() && self.updates.is_empty() && self.inserts.is_empty()
    }

    fn unchanged(existing: &ExistingState) -> Self {
        Self {
            summary: PlanSummary {
                kept: existing.len(),
                ..PlanSummary::default()
            },
            ..Self::default()
        }
    }
}

pub fn plan_sync(
    prepared: &PreparedSync,
    existing: &ExistingState,
    options: &PlanOptions,
) -> SyncPlan {
    match &prepared.intent {
        SyncIntent::Preserve => SyncPlan::unchanged(existing),
        SyncIntent::ClearAll => {
            let mut draft = Draft::new(existing, Sex::ALL.into_iter().collect());
            for row in existing.all_rows() {
                draft.set(row.id, Decision::Delete(DeleteReason::Cleared));
            }
            draft.into_plan()
        }
        SyncIntent::Apply {
            descriptors,
            full_replace,
        } => merge(descriptors, *full_replace, existing, options),
    }
}

fn merge(
    descriptors: &[NormalizedDescriptor],
    full_replace: bool,
    existing: &ExistingState,
    options: &PlanOptions,
) -> SyncPlan {
    let touched: BTreeSet<Sex> = if full_replace {
        Sex::ALL.into_iter().collect()
    } else {
        descriptors.iter().map(|d| d.content.sex).collect()
    };
    let mut draft = Draft::new(existing, touched.clone());

    for duplicate in &existing.duplicates {
        if touched.contains(&duplicate.content.sex) {
            draft.set(duplicate.id, Decision::Delete(DeleteReason::Duplicate));
        }
    }

    let (matched, vacated) = match_descriptors(&mut draft, descriptors);

    let mut pooled_placeholders: BTreeMap<Sex, Vec<&StoredRange>> = BTreeMap::new();
    let mut pooled_fallbacks: BTreeMap<Sex, Vec<&StoredRange>> = BTreeMap::new();
    for row in &existing.rows {
        let sex = row.content.sex;
        if matched.contains(&row.id) || !touched.contains(&sex) {
            continue;
        }
        match row.kind() {
            RowKind::Placeholder => pooled_placeholders.entry(sex).or_default().push(row),
            RowKind::Fallback => pooled_fallbacks.entry(sex).or_default().push(row),
            RowKind::Real | RowKind::Empty => {
                draft.set(row.id, Decision::Delete(DeleteReason::Replaced))
            }
        }
    }

    let real = draft.real_intervals();

    // Untouched groups whose placeholders may now be stale: groups whose
    // coverage borrows from a touched group, and groups a row left by id.
    // Only their placeholders are reconsidered.
    let refill: BTreeSet<Sex> = coverage_dependents(&touched)
        .filter(|sex| real.get(sex).is_some_and(|intervals| !intervals.is_empty()))
        .chain(vacated)
        .filter(|sex| !touched.contains(sex))
        .collect();
    for row in &existing.rows {
        if refill.contains(&row.content.sex)
            && !matched.contains(&row.id)
            && row.kind() == RowKind::Placeholder
        {
            pooled_placeholders
                .entry(row.content.sex)
                .or_default()
                .push(row);
        }
    }

    for &sex in touched.iter().chain(&refill) {
        let desired = gap_fill::placeholders_for(sex, &real, options.max_age_years);
        let pooled = pooled_placeholders.remove(&sex).unwrap_or_default();
        absorb_placeholders(&mut draft, pooled, desired);
    }

    let candidates: BTreeSet<Sex> = descriptors
        .iter()
        .filter(|d| d.role == DescriptorRole::PlaceholderCandidate)
        .map(|d| d.content.sex)
        .collect();
    fallback::settle_groups(&mut draft, &real, &candidates, pooled_fallbacks);
    fallback::collapse_parameter(&mut draft);

    draft.drop_redundant_inserts();
    draft.into_plan()
}

/// Groups whose effective coverage reads from one of `touched`.
fn coverage_dependents(touched: &BTreeSet<Sex>) -> impl Iterator<Item = Sex> {
    let specific_touched = touched.contains(&Sex::Masculino) || touched.contains(&Sex::Femenino);
    let ambos_touched = touched.contains(&Sex::Ambos);
    let mut dependents = BTreeSet::new();
    if specific_touched {
        dependents.insert(Sex::Ambos);
    }
    if ambos_touched {
        dependents.extend([Sex::Masculino, Sex::Femenino]);
    }
    dependents.into_iter()
}

/// Pair real descriptors with stored rows; unpaired descriptors become inserts.
///
/// Returns the paired row ids and the groups that lost a row because an
/// id-matched descriptor moved it to another sex.
fn match_descriptors(
    draft: &mut Draft<'_>,
    descriptors: &[NormalizedDescriptor],
) -> (HashSet<RangeId>, BTreeSet<Sex>) {
    let existing = draft.existing;
    let mut matched = HashSet::new();
    let mut vacated = BTreeSet::new();

    for descriptor in descriptors
        .iter()
        .filter(|d| d.role == DescriptorRole::Real)
    {
        let by_id = descriptor
            .id
            .filter(|id| !matched.contains(id))
            .and_then(|id| existing.rows.iter().find(|row| row.id == id));
        let target = by_id.or_else(|| find_slot(existing, &descriptor.content, &matched));

        match target {
            Some(row) => {
                matched.insert(row.id);
                if row.content.sex != descriptor.content.sex {
                    vacated.insert(row.content.sex);
                }
                if row.content != descriptor.content {
                    draft.set(row.id, Decision::Update(descriptor.content.clone()));
                }
            }
            None => draft
                .inserts
                .push((InsertOrigin::Client, descriptor.content.clone())),
        }
    }

    (matched, vacated)
}

/// Best unpaired stored row sharing the descriptor's `(sex, age_min, age_max)`,
/// preferring one that also agrees on unit and method. Engine-generated rows
/// never take a client slot.
fn find_slot<'a>(
    existing: &'a ExistingState,
    content: &RangeContent,
    matched: &HashSet<RangeId>,
) -> Option<&'a StoredRange> {
    let slot = content.slot_key();
    existing
        .rows
        .iter()
        .filter(|row| !matched.contains(&row.id))
        .filter(|row| matches!(row.kind(), RowKind::Real | RowKind::Empty))
        .filter(|row| row.content.slot_key() == slot)
        .max_by_key(|row| {
            let agreement = usize::from(row.content.unit == content.unit)
                + usize::from(row.content.method == content.method);
            (agreement, std::cmp::Reverse(row.id))
        })
}

/// Keep stored placeholders that still match a computed gap; delete the rest
/// (they are now covered by real data) and insert whatever is still missing.
fn absorb_placeholders(draft: &mut Draft<'_>, pooled: Vec<&StoredRange>, mut desired: Vec<RangeContent>) {
    for row in pooled {
        let key = row.content.dedup_key();
        match desired.iter().position(|d| d.dedup_key() == key) {
            Some(pos) => {
                desired.remove(pos);
            }
            None => draft.set(row.id, Decision::Delete(DeleteReason::Absorbed)),
        }
    }
    draft
        .inserts
        .extend(desired.into_iter().map(|c| (InsertOrigin::GapFill, c)));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeleteReason {
    Replaced,
    Duplicate,
    Absorbed,
    Cleared,
    Collapsed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Decision {
    Keep,
    Update(RangeContent),
    Delete(DeleteReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InsertOrigin {
    Client,
    GapFill,
    Fallback,
}

/// Working state of one planning pass.
pub(crate) struct Draft<'a> {
    pub(crate) existing: &'a ExistingState,
    pub(crate) touched: BTreeSet<Sex>,
    pub(crate) decisions: BTreeMap<RangeId, Decision>,
    pub(crate) inserts: Vec<(InsertOrigin, RangeContent)>,
    pub(crate) fallback_applied: bool,
    by_id: HashMap<RangeId, &'a StoredRange>,
}

impl<'a> Draft<'a> {
    fn new(existing: &'a ExistingState, touched: BTreeSet<Sex>) -> Self {
        let by_id: HashMap<RangeId, &StoredRange> =
            existing.all_rows().map(|row| (row.id, row)).collect();
        Self {
            existing,
            touched,
            decisions: by_id.keys().map(|&id| (id, Decision::Keep)).collect(),
            inserts: Vec::new(),
            fallback_applied: false,
            by_id,
        }
    }

    pub(crate) fn set(&mut self, id: RangeId, decision: Decision) {
        self.decisions.insert(id, decision);
    }

    /// Content a stored row will have after the plan, `None` if it is deleted.
    pub(crate) fn final_content(&self, id: RangeId) -> Option<&RangeContent> {
        match self.decisions.get(&id)? {
            Decision::Keep => self.by_id.get(&id).map(|row| &row.content),
            Decision::Update(content) => Some(content),
            Decision::Delete(_) => None,
        }
    }

    pub(crate) fn final_rows(&self) -> Vec<&RangeContent> {
        self.decisions
            .keys()
            .filter_map(|&id| self.final_content(id))
            .chain(self.inserts.iter().map(|(_, content)| content))
            .collect()
    }

    pub(crate) fn real_intervals(&self) -> RealIntervals {
        let mut real = RealIntervals::new();
        for content in self.final_rows().into_iter().filter(|c| c.is_real()) {
            real.entry(content.sex).or_default().push(content.interval());
        }
        real
    }

    fn drop_redundant_inserts(&mut self) {
        let mut seen: HashSet<_> = self
            .decisions
            .keys()
            .filter_map(|&id| self.final_content(id))
            .map(RangeContent::dedup_key)
            .collect();
        self.inserts
            .retain(|(_, content)| seen.insert(content.dedup_key()));
    }

    fn into_plan(self) -> SyncPlan {
        let mut plan = SyncPlan::default();
        let mut summary = PlanSummary {
            touched: self.touched.iter().copied().collect(),
            fallback_applied: self.fallback_applied,
            ..PlanSummary::default()
        };

        for (id, decision) in self.decisions {
            match decision {
                Decision::Keep => summary.kept += 1,
                Decision::Update(content) => plan.updates.push(RangeUpdate { id, content }),
                Decision::Delete(reason) => {
                    match reason {
                        DeleteReason::Absorbed => summary.placeholders_absorbed += 1,
                        DeleteReason::Duplicate => summary.duplicates_removed += 1,
                        _ => {}
                    }
                    plan.deletes.push(id);
                }
            }
        }

        summary.placeholders_inserted = self
            .inserts
            .iter()
            .filter(|(origin, _)| *origin == InsertOrigin::GapFill)
            .count();
        plan.inserts = self.inserts.into_iter().map(|(_, content)| content).collect();

        summary.inserted = plan.inserts.len();
        summary.updated = plan.updates.len();
        summary.deleted = plan.deletes.len();
        plan.summary = summary;
        plan
    }
}
