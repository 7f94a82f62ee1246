//! Reference-range synchronization service
//!
//! Drives one synchronization call end to end:
//! 1. Size check, normalization and validation, with no lock held
//! 2. Per-parameter lock, then a snapshot of the stored rows
//! 3. Planning (diff/merge, gap filling, fallback collapsing)
//! 4. Applying the plan and re-reading the result inside the same transaction

use labsync_ranges::{
    dedup_sorted, plan_sync, prepare, ExistingState, NormalizationNote, NormalizationReport,
    NormalizeOptions, ParameterId, PlanOptions, PlanSummary, PreparedSync, StoredRange, SyncPlan,
    SyncRequest,
};
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::{
    config::Config,
    db::{RangeStore, RangeTransaction},
    metrics::{
        RANGE_LOCK_TIMEOUTS_TOTAL, RANGE_SYNC_DURATION_SECONDS, RANGE_SYNC_TOTAL,
        SEX_COERCIONS_TOTAL,
    },
    services::applier::apply_plan,
    Error, Result,
};

/// Knobs of the sync path, resolved once from [`Config`].
#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    pub normalize: NormalizeOptions,
    pub plan: PlanOptions,
    pub lock_timeout: Duration,
    pub max_ranges_per_request: usize,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            normalize: config.ranges.normalize_options(),
            plan: config.ranges.plan_options(),
            lock_timeout: config.database.lock_timeout(),
            max_ranges_per_request: config.ranges.max_ranges_per_request,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Result of a synchronization call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub parameter_id: ParameterId,
    /// Final canonical range list, deduplicated and age-sorted.
    pub ranges: Vec<StoredRange>,
    pub summary: PlanSummary,
    pub normalization: Vec<NormalizationNote>,
}

/// Result of a dry run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPreview {
    pub parameter_id: ParameterId,
    pub plan: SyncPlan,
    pub normalization: Vec<NormalizationNote>,
}

pub struct RangeSyncService<S: RangeStore> {
    store: S,
    settings: SyncSettings,
}

impl<S: RangeStore> RangeSyncService<S> {
    pub fn new(store: S, settings: SyncSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Synchronize the stored ranges of a parameter with `request`.
    ///
    /// Either the whole plan commits or nothing changes.
    #[tracing::instrument(
        name = "range_sync",
        skip(self, request),
        fields(descriptors = request.descriptor_count(), clear_ranges = request.clear_ranges)
    )]
    pub async fn sync(&self, parameter_id: ParameterId, request: &SyncRequest) -> Result<SyncOutcome> {
        let started = Instant::now();
        let result = self.run_sync(parameter_id, request).await;
        RANGE_SYNC_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

        let outcome = match &result {
            Ok(done) if wrote_rows(&done.summary) => "applied",
            Ok(_) => "unchanged",
            Err(Error::SyncLockTimeout { .. }) => {
                RANGE_LOCK_TIMEOUTS_TOTAL.inc();
                "lock_timeout"
            }
            Err(
                Error::Range(_)
                | Error::Validation(_)
                | Error::ParameterNotFound(_)
                | Error::StoredOverlap(_),
            ) => "rejected",
            Err(_) => "failed",
        };
        RANGE_SYNC_TOTAL.with_label_values(&[outcome]).inc();

        if let Err(e) = &result {
            tracing::warn!(parameter_id, code = e.code(), error = %e, "Reference-range sync failed");
        }
        result
    }

    async fn run_sync(&self, parameter_id: ParameterId, request: &SyncRequest) -> Result<SyncOutcome> {
        let prepared = self.prepare_request(parameter_id, request)?;

        if prepared.is_preserve() {
            // Nothing to write, so no lock: report the stored state as is.
            let rows = self.snapshot(parameter_id).await?;
            let existing = ExistingState::from_rows(rows.clone());
            let plan = plan_sync(&prepared, &existing, &self.settings.plan);
            return Ok(SyncOutcome {
                parameter_id,
                ranges: dedup_sorted(rows),
                summary: plan.summary,
                normalization: prepared.report.notes,
            });
        }

        let mut tx = self
            .store
            .begin_locked(parameter_id, self.settings.lock_timeout)
            .await?;

        let existing = ExistingState::from_rows(tx.load_ranges().await?);
        let plan = plan_sync(&prepared, &existing, &self.settings.plan);

        let counts = match apply_plan(&mut tx, &plan).await {
            Ok(counts) => counts,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(parameter_id, error = %rollback_err, "Rollback failed");
                }
                return Err(e);
            }
        };

        let rows = tx.load_ranges().await?;
        tx.commit().await?;
        counts.record_metrics();

        let summary = plan.summary;
        tracing::info!(
            parameter_id,
            touched = ?summary.touched,
            inserted = summary.inserted,
            updated = summary.updated,
            deleted = summary.deleted,
            kept = summary.kept,
            placeholders_inserted = summary.placeholders_inserted,
            placeholders_absorbed = summary.placeholders_absorbed,
            duplicates_removed = summary.duplicates_removed,
            fallback_applied = summary.fallback_applied,
            skipped_inserts = counts.skipped,
            "Reference ranges synchronized"
        );

        Ok(SyncOutcome {
            parameter_id,
            ranges: dedup_sorted(rows),
            summary,
            normalization: prepared.report.notes,
        })
    }

    /// Compute the plan a sync would apply right now, without writing.
    #[tracing::instrument(name = "range_plan", skip(self, request))]
    pub async fn plan(&self, parameter_id: ParameterId, request: &SyncRequest) -> Result<PlanPreview> {
        let prepared = self.prepare_request(parameter_id, request)?;
        let existing = ExistingState::from_rows(self.snapshot(parameter_id).await?);
        let plan = plan_sync(&prepared, &existing, &self.settings.plan);

        Ok(PlanPreview {
            parameter_id,
            plan,
            normalization: prepared.report.notes,
        })
    }

    fn prepare_request(&self, parameter_id: ParameterId, request: &SyncRequest) -> Result<PreparedSync> {
        let count = request.descriptor_count();
        if count > self.settings.max_ranges_per_request {
            return Err(Error::Validation(format!(
                "{count} ranges submitted, at most {} allowed per request",
                self.settings.max_ranges_per_request
            )));
        }

        let prepared = prepare(request, &self.settings.normalize)?;
        log_coercions(parameter_id, &prepared.report);
        Ok(prepared)
    }

    async fn snapshot(&self, parameter_id: ParameterId) -> Result<Vec<StoredRange>> {
        if self.store.get_parameter(parameter_id).await?.is_none() {
            return Err(Error::ParameterNotFound(parameter_id));
        }
        self.store.list_ranges(parameter_id).await
    }
}

fn wrote_rows(summary: &PlanSummary) -> bool {
    summary.inserted + summary.updated + summary.deleted > 0
}

fn log_coercions(parameter_id: ParameterId, report: &NormalizationReport) {
    for (index, raw) in report.sex_coercions() {
        SEX_COERCIONS_TOTAL.inc();
        tracing::warn!(
            parameter_id,
            descriptor = index,
            raw_sex = raw,
            "Unrecognized sex token coerced to Ambos"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryRangeStore;
    use labsync_ranges::{RangeError, SexPolicy};
    use serde_json::json;

    fn request(value: serde_json::Value) -> SyncRequest {
        serde_json::from_value(value).unwrap()
    }

    async fn service() -> (RangeSyncService<InMemoryRangeStore>, InMemoryRangeStore, ParameterId) {
        let store = InMemoryRangeStore::new();
        let parameter = store.add_parameter(1, "Hemoglobin").await;
        let service = RangeSyncService::new(store.clone(), SyncSettings::default());
        (service, store, parameter.id)
    }

    #[tokio::test]
    async fn sync_returns_the_final_list() {
        let (service, _, id) = service().await;
        let outcome = service
            .sync(
                id,
                &request(json!({"ranges": [
                    {"sex": "Ambos", "ageMin": 0, "ageMax": 17, "ageUnit": "years", "lower": 4.5, "upper": 11}
                ]})),
            )
            .await
            .unwrap();

        assert_eq!(outcome.ranges.len(), 2);
        assert_eq!(outcome.summary.placeholders_inserted, 1);
        assert!(outcome.normalization.is_empty());
    }

    #[tokio::test]
    async fn lenient_sex_is_reported() {
        let (service, _, id) = service().await;
        let outcome = service
            .sync(
                id,
                &request(json!({"ranges": [
                    {"sex": "X", "ageUnit": "years", "lower": 1, "upper": 2}
                ]})),
            )
            .await
            .unwrap();

        assert!(matches!(
            outcome.normalization.as_slice(),
            [NormalizationNote::SexCoerced { index: 0, .. }]
        ));
    }

    #[tokio::test]
    async fn strict_sex_is_rejected_before_locking() {
        let store = InMemoryRangeStore::new();
        let parameter = store.add_parameter(1, "Hemoglobin").await;
        let mut settings = SyncSettings::default();
        settings.normalize.sex_policy = SexPolicy::Strict;
        let service = RangeSyncService::new(store.clone(), settings);

        // A held lock would turn any lock attempt into a timeout.
        let _held = store.lock_parameter(parameter.id).await;
        let err = service
            .sync(
                parameter.id,
                &request(json!({"ranges": [{"sex": "X", "lower": 1, "upper": 2}]})),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Range(RangeError::InvalidSex { index: 0, .. })));
    }

    #[tokio::test]
    async fn oversized_requests_are_rejected() {
        let store = InMemoryRangeStore::new();
        let parameter = store.add_parameter(1, "Hemoglobin").await;
        let settings = SyncSettings {
            max_ranges_per_request: 1,
            ..SyncSettings::default()
        };
        let service = RangeSyncService::new(store, settings);

        let err = service
            .sync(
                parameter.id,
                &request(json!({"ranges": [
                    {"sex": "Ambos", "ageMin": 0, "ageMax": 1, "lower": 1},
                    {"sex": "Ambos", "ageMin": 2, "ageMax": 3, "lower": 1}
                ]})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn preserve_does_not_need_the_lock() {
        let (service, store, id) = service().await;
        let _held = store.lock_parameter(id).await;

        let outcome = service.sync(id, &request(json!({}))).await.unwrap();
        assert!(outcome.ranges.is_empty());
    }

    #[tokio::test]
    async fn unknown_parameter_is_not_found() {
        let (service, _, _) = service().await;
        let err = service
            .sync(404, &request(json!({"ranges": [{"sex": "Ambos", "lower": 1}]})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ParameterNotFound(404)));

        let err = service.sync(404, &request(json!({}))).await.unwrap_err();
        assert!(matches!(err, Error::ParameterNotFound(404)));
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let (service, store, id) = service().await;
        let preview = service
            .plan(
                id,
                &request(json!({"ranges": [
                    {"sex": "Masculino", "ageMin": 0, "ageMax": 10, "lower": 1}
                ]})),
            )
            .await
            .unwrap();

        assert_eq!(preview.plan.inserts.len(), 2);
        assert_eq!(store.range_count().await, 0);
    }
}
