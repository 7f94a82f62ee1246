//! In-memory range store for tests and local runs without a database.
//!
//! Mirrors the Postgres semantics the sync path relies on: one exclusive lock
//! per parameter with a bounded wait, all-or-nothing commits, and rejection of
//! rows that collide on the content key.

use async_trait::async_trait;
use chrono::Utc;
use labsync_ranges::{ParameterId, RangeContent, RangeId, StoredRange};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::traits::{InsertOutcome, RangeStore, RangeTransaction};
use crate::{models::ParameterRecord, Error, Result};

#[derive(Clone, Default)]
pub struct InMemoryRangeStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    data: RwLock<Data>,
    locks: Mutex<HashMap<ParameterId, Arc<Mutex<()>>>>,
}

#[derive(Default)]
struct Data {
    parameters: BTreeMap<ParameterId, ParameterRecord>,
    ranges: BTreeMap<RangeId, StoredRange>,
    next_parameter_id: ParameterId,
    next_range_id: RangeId,
}

impl Data {
    fn allocate_range_id(&mut self) -> RangeId {
        self.next_range_id += 1;
        self.next_range_id
    }

    fn ranges_of(&self, parameter_id: ParameterId) -> Vec<StoredRange> {
        self.ranges
            .values()
            .filter(|row| row.parameter_id == parameter_id)
            .cloned()
            .collect()
    }
}

impl InMemoryRangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parameter at the end of its study.
    pub async fn add_parameter(&self, study_id: i64, name: &str) -> ParameterRecord {
        let mut data = self.inner.data.write().await;
        data.next_parameter_id += 1;
        let position = data
            .parameters
            .values()
            .filter(|p| p.study_id == study_id)
            .count() as i32;
        let now = Utc::now();
        let record = ParameterRecord {
            id: data.next_parameter_id,
            study_id,
            name: name.to_string(),
            unit: None,
            decimals: None,
            position,
            created_at: now,
            updated_at: now,
        };
        data.parameters.insert(record.id, record.clone());
        record
    }

    /// Store a row without any uniqueness check, the way legacy data with
    /// duplicates looks.
    pub async fn insert_raw(&self, parameter_id: ParameterId, content: RangeContent) -> RangeId {
        let mut data = self.inner.data.write().await;
        let id = data.allocate_range_id();
        data.ranges.insert(
            id,
            StoredRange {
                id,
                parameter_id,
                content,
            },
        );
        id
    }

    /// Take the exclusive lock of a parameter outside any sync. Syncs of that
    /// parameter wait until the guard drops.
    pub async fn lock_parameter(&self, parameter_id: ParameterId) -> OwnedMutexGuard<()> {
        self.parameter_lock(parameter_id).await.lock_owned().await
    }

    pub async fn range_count(&self) -> usize {
        self.inner.data.read().await.ranges.len()
    }

    /// Entries nobody holds or waits on are dropped here, so the table only
    /// tracks parameters with a live transaction or a pending writer.
    async fn parameter_lock(&self, parameter_id: ParameterId) -> Arc<Mutex<()>> {
        let mut locks = self.inner.locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(parameter_id).or_default().clone()
    }
}

#[async_trait]
impl RangeStore for InMemoryRangeStore {
    type Transaction = InMemoryRangeTransaction;

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get_parameter(&self, parameter_id: ParameterId) -> Result<Option<ParameterRecord>> {
        let data = self.inner.data.read().await;
        Ok(data.parameters.get(&parameter_id).cloned())
    }

    async fn list_study_parameters(&self, study_id: i64) -> Result<Vec<ParameterRecord>> {
        let data = self.inner.data.read().await;
        let mut parameters: Vec<_> = data
            .parameters
            .values()
            .filter(|p| p.study_id == study_id)
            .cloned()
            .collect();
        parameters.sort_by_key(|p| (p.position, p.id));
        Ok(parameters)
    }

    async fn list_ranges(&self, parameter_id: ParameterId) -> Result<Vec<StoredRange>> {
        Ok(self.inner.data.read().await.ranges_of(parameter_id))
    }

    async fn list_ranges_for(&self, parameter_ids: &[ParameterId]) -> Result<Vec<StoredRange>> {
        let data = self.inner.data.read().await;
        let mut rows: Vec<_> = data
            .ranges
            .values()
            .filter(|row| parameter_ids.contains(&row.parameter_id))
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.parameter_id, row.id));
        Ok(rows)
    }

    async fn list_all_ranges(&self) -> Result<Vec<StoredRange>> {
        let data = self.inner.data.read().await;
        let mut rows: Vec<_> = data.ranges.values().cloned().collect();
        rows.sort_by_key(|row| (row.parameter_id, row.id));
        Ok(rows)
    }

    async fn begin_locked(
        &self,
        parameter_id: ParameterId,
        lock_timeout: Duration,
    ) -> Result<InMemoryRangeTransaction> {
        if self.get_parameter(parameter_id).await?.is_none() {
            return Err(Error::ParameterNotFound(parameter_id));
        }

        let lock = self.parameter_lock(parameter_id).await;
        let guard = tokio::time::timeout(lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| Error::SyncLockTimeout { parameter_id })?;

        let working = self
            .inner
            .data
            .read()
            .await
            .ranges_of(parameter_id)
            .into_iter()
            .map(|row| (row.id, row))
            .collect();

        Ok(InMemoryRangeTransaction {
            store: self.clone(),
            parameter_id,
            working,
            _guard: guard,
        })
    }
}

/// Working copy of one parameter's rows. Nothing is visible to readers until
/// `commit` swaps it in.
pub struct InMemoryRangeTransaction {
    store: InMemoryRangeStore,
    parameter_id: ParameterId,
    working: BTreeMap<RangeId, StoredRange>,
    _guard: OwnedMutexGuard<()>,
}

impl InMemoryRangeTransaction {
    fn conflicting(&self, content: &RangeContent, except: Option<RangeId>) -> Option<&StoredRange> {
        let key = content.dedup_key();
        self.working
            .values()
            .find(|row| Some(row.id) != except && row.content.dedup_key() == key)
    }

    fn overlap(&self, content: &RangeContent) -> Error {
        Error::StoredOverlap(format!(
            "parameter {}: a stored {} range already occupies {}",
            self.parameter_id,
            content.sex,
            content.interval()
        ))
    }
}

#[async_trait]
impl RangeTransaction for InMemoryRangeTransaction {
    fn parameter_id(&self) -> ParameterId {
        self.parameter_id
    }

    async fn load_ranges(&mut self) -> Result<Vec<StoredRange>> {
        Ok(self.working.values().cloned().collect())
    }

    async fn delete_ranges(&mut self, ids: &[RangeId]) -> Result<u64> {
        let mut deleted = 0;
        for id in ids {
            if self.working.remove(id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn update_range(&mut self, id: RangeId, content: &RangeContent) -> Result<()> {
        if self.conflicting(content, Some(id)).is_some() {
            return Err(self.overlap(content));
        }
        let parameter_id = self.parameter_id;
        let row = self.working.get_mut(&id).ok_or_else(|| {
            Error::Internal(format!(
                "reference range {id} vanished from parameter {parameter_id} while locked"
            ))
        })?;
        row.content = content.clone();
        Ok(())
    }

    async fn insert_range(&mut self, content: &RangeContent) -> Result<InsertOutcome> {
        if let Some(existing) = self.conflicting(content, None) {
            return if existing.content == *content {
                Ok(InsertOutcome::AlreadyPresent(existing.id))
            } else {
                Err(self.overlap(content))
            };
        }

        let id = self.store.inner.data.write().await.allocate_range_id();
        self.working.insert(
            id,
            StoredRange {
                id,
                parameter_id: self.parameter_id,
                content: content.clone(),
            },
        );
        Ok(InsertOutcome::Inserted(id))
    }

    async fn commit(self) -> Result<()> {
        let mut data = self.store.inner.data.write().await;
        let parameter_id = self.parameter_id;
        data.ranges.retain(|_, row| row.parameter_id != parameter_id);
        data.ranges.extend(self.working);
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
