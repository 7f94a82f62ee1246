//! PostgreSQL transaction holding a parameter's advisory lock

use async_trait::async_trait;
use labsync_ranges::{ParameterId, RangeContent, RangeId, StoredRange};
use sqlx::{Postgres, Transaction};

use super::{
    store::{bind_content, range_from_row, RANGE_COLUMNS},
    traits::{InsertOutcome, RangeTransaction},
};
use crate::{Error, Result};

/// High bits of every range advisory lock key ("RangeSyn"), keeping them clear
/// of advisory locks other code might take on raw ids.
const RANGE_LOCK_NAMESPACE: i64 = 0x5261_6e67_6553_796e;

const UNIQUE_VIOLATION: &str = "23505";

/// Advisory lock key guarding the ranges of `parameter_id`.
pub fn range_lock_key(parameter_id: ParameterId) -> i64 {
    RANGE_LOCK_NAMESPACE ^ parameter_id
}

/// A transaction that holds `pg_advisory_xact_lock(range_lock_key(id))`.
/// Postgres releases the lock when the transaction ends, however it ends.
pub struct PostgresRangeTransaction {
    tx: Option<Transaction<'static, Postgres>>,
    parameter_id: ParameterId,
}

impl PostgresRangeTransaction {
    pub(crate) fn new(tx: Transaction<'static, Postgres>, parameter_id: ParameterId) -> Self {
        Self {
            tx: Some(tx),
            parameter_id,
        }
    }

    pub(crate) fn tx_mut(&mut self) -> Result<&mut Transaction<'static, Postgres>> {
        self.tx.as_mut().ok_or_else(|| {
            Error::Internal("Transaction already committed or rolled back".to_string())
        })
    }

    /// The stored row occupying the uniqueness slot of `content`, if any.
    async fn find_conflicting(&mut self, content: &RangeContent) -> Result<Option<StoredRange>> {
        let parameter_id = self.parameter_id;
        let tx = self.tx_mut()?;

        let row = sqlx::query(&format!(
            "SELECT {RANGE_COLUMNS} FROM reference_ranges
             WHERE parameter_id = $1
               AND sex = $2
               AND age_min IS NOT DISTINCT FROM $3
               AND age_max IS NOT DISTINCT FROM $4
               AND age_unit = $5
               AND value_kind = $6
               AND lower_value IS NOT DISTINCT FROM $7
               AND upper_value IS NOT DISTINCT FROM $8
               AND text_value IS NOT DISTINCT FROM $9
               AND unit IS NOT DISTINCT FROM $10
               AND method IS NOT DISTINCT FROM $11
             LIMIT 1"
        ))
        .bind(parameter_id)
        .bind(content.sex.as_str())
        .bind(content.age_min)
        .bind(content.age_max)
        .bind(content.age_unit.as_str())
        .bind(content.value.kind().as_str())
        .bind(content.value.lower())
        .bind(content.value.upper())
        .bind(content.value.text())
        .bind(content.unit.as_deref())
        .bind(content.method.as_deref())
        .fetch_optional(&mut **tx)
        .await?;

        row.as_ref().map(range_from_row).transpose()
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION)
}

fn overlap_message(parameter_id: ParameterId, content: &RangeContent) -> String {
    format!(
        "parameter {parameter_id}: a stored {} range already occupies {}",
        content.sex,
        content.interval()
    )
}

#[async_trait]
impl RangeTransaction for PostgresRangeTransaction {
    fn parameter_id(&self) -> ParameterId {
        self.parameter_id
    }

    async fn load_ranges(&mut self) -> Result<Vec<StoredRange>> {
        let parameter_id = self.parameter_id;
        let tx = self.tx_mut()?;

        let rows = sqlx::query(&format!(
            "SELECT {RANGE_COLUMNS} FROM reference_ranges WHERE parameter_id = $1 ORDER BY id"
        ))
        .bind(parameter_id)
        .fetch_all(&mut **tx)
        .await?;

        rows.iter().map(range_from_row).collect()
    }

    async fn delete_ranges(&mut self, ids: &[RangeId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let parameter_id = self.parameter_id;
        let tx = self.tx_mut()?;

        let deleted = sqlx::query(
            "DELETE FROM reference_ranges
             WHERE parameter_id = $1 AND id = ANY($2)",
        )
        .bind(parameter_id)
        .bind(ids)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        Ok(deleted)
    }

    async fn update_range(&mut self, id: RangeId, content: &RangeContent) -> Result<()> {
        let parameter_id = self.parameter_id;
        let tx = self.tx_mut()?;

        let query = sqlx::query(
            "UPDATE reference_ranges
             SET sex = $3, age_min = $4, age_max = $5, age_unit = $6, value_kind = $7,
                 lower_value = $8, upper_value = $9, text_value = $10, notes = $11,
                 unit = $12, method = $13, updated_at = now()
             WHERE parameter_id = $1 AND id = $2",
        )
        .bind(parameter_id)
        .bind(id);

        let updated = match bind_content(query, content).execute(&mut **tx).await {
            Ok(result) => result.rows_affected(),
            Err(e) if is_unique_violation(&e) => {
                return Err(Error::StoredOverlap(overlap_message(parameter_id, content)));
            }
            Err(e) => return Err(e.into()),
        };

        if updated == 0 {
            return Err(Error::Internal(format!(
                "reference range {id} vanished from parameter {parameter_id} while locked"
            )));
        }
        Ok(())
    }

    async fn insert_range(&mut self, content: &RangeContent) -> Result<InsertOutcome> {
        let parameter_id = self.parameter_id;
        let tx = self.tx_mut()?;

        let query = sqlx::query_scalar::<_, i64>(
            "INSERT INTO reference_ranges
                 (parameter_id, sex, age_min, age_max, age_unit, value_kind,
                  lower_value, upper_value, text_value, notes, unit, method)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT DO NOTHING
             RETURNING id",
        )
        .bind(parameter_id)
        .bind(content.sex.as_str())
        .bind(content.age_min)
        .bind(content.age_max)
        .bind(content.age_unit.as_str())
        .bind(content.value.kind().as_str())
        .bind(content.value.lower())
        .bind(content.value.upper())
        .bind(content.value.text())
        .bind(content.notes.as_deref())
        .bind(content.unit.as_deref())
        .bind(content.method.as_deref());

        if let Some(id) = query.fetch_optional(&mut **tx).await? {
            return Ok(InsertOutcome::Inserted(id));
        }

        match self.find_conflicting(content).await? {
            Some(existing) if existing.content == *content => {
                Ok(InsertOutcome::AlreadyPresent(existing.id))
            }
            _ => Err(Error::StoredOverlap(overlap_message(parameter_id, content))),
        }
    }

    async fn commit(mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| Error::Internal("Transaction already committed".to_string()))?;

        tx.commit().await.map_err(Error::Database)
    }

    async fn rollback(mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| Error::Internal("Transaction already rolled back".to_string()))?;

        tx.rollback().await.map_err(Error::Database)
    }
}
