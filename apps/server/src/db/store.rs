//! PostgreSQL-backed range store

use async_trait::async_trait;
use labsync_ranges::{
    AgeUnit, ParameterId, RangeContent, RangeValue, Sex, StoredRange, ValueKind,
};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use std::time::Duration;

use super::{
    traits::RangeStore,
    transaction::{range_lock_key, PostgresRangeTransaction},
};
use crate::{models::ParameterRecord, Error, Result};

pub(crate) const RANGE_COLUMNS: &str = "id, parameter_id, sex, age_min, age_max, age_unit, \
     value_kind, lower_value, upper_value, text_value, notes, unit, method";

const PARAMETER_COLUMNS: &str =
    "id, study_id, name, unit, decimals, position, created_at, updated_at";

/// SQLSTATE raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

#[derive(Clone)]
pub struct PostgresRangeStore {
    pool: PgPool,
}

impl PostgresRangeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RangeStore for PostgresRangeStore {
    type Transaction = PostgresRangeTransaction;

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_parameter(&self, parameter_id: ParameterId) -> Result<Option<ParameterRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {PARAMETER_COLUMNS} FROM parameters WHERE id = $1"
        ))
        .bind(parameter_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(parameter_from_row).transpose()
    }

    async fn list_study_parameters(&self, study_id: i64) -> Result<Vec<ParameterRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {PARAMETER_COLUMNS} FROM parameters WHERE study_id = $1 ORDER BY position, id"
        ))
        .bind(study_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parameter_from_row).collect()
    }

    async fn list_ranges(&self, parameter_id: ParameterId) -> Result<Vec<StoredRange>> {
        let rows = sqlx::query(&format!(
            "SELECT {RANGE_COLUMNS} FROM reference_ranges WHERE parameter_id = $1 ORDER BY id"
        ))
        .bind(parameter_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(range_from_row).collect()
    }

    async fn list_ranges_for(&self, parameter_ids: &[ParameterId]) -> Result<Vec<StoredRange>> {
        if parameter_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            "SELECT {RANGE_COLUMNS} FROM reference_ranges
             WHERE parameter_id = ANY($1)
             ORDER BY parameter_id, id"
        ))
        .bind(parameter_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(range_from_row).collect()
    }

    async fn list_all_ranges(&self) -> Result<Vec<StoredRange>> {
        let rows = sqlx::query(&format!(
            "SELECT {RANGE_COLUMNS} FROM reference_ranges ORDER BY parameter_id, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(range_from_row).collect()
    }

    async fn begin_locked(
        &self,
        parameter_id: ParameterId,
        lock_timeout: Duration,
    ) -> Result<PostgresRangeTransaction> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM parameters WHERE id = $1")
            .bind(parameter_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(Error::ParameterNotFound(parameter_id));
        }

        // Bound only the advisory lock wait, then restore the session default.
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", lock_timeout.as_millis().max(1)))
            .execute(&mut *tx)
            .await?;

        let locked = sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(range_lock_key(parameter_id))
            .execute(&mut *tx)
            .await;
        match locked {
            Ok(_) => {}
            Err(e) if is_lock_timeout(&e) => {
                return Err(Error::SyncLockTimeout { parameter_id });
            }
            Err(e) => return Err(e.into()),
        }

        sqlx::query("SET LOCAL lock_timeout = DEFAULT")
            .execute(&mut *tx)
            .await?;

        tracing::debug!(parameter_id, "Acquired reference-range lock");
        Ok(PostgresRangeTransaction::new(tx, parameter_id))
    }
}

fn is_lock_timeout(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == LOCK_NOT_AVAILABLE)
}

fn parameter_from_row(row: &PgRow) -> Result<ParameterRecord> {
    Ok(ParameterRecord {
        id: row.try_get("id")?,
        study_id: row.try_get("study_id")?,
        name: row.try_get("name")?,
        unit: row.try_get("unit")?,
        decimals: row.try_get("decimals")?,
        position: row.try_get("position")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn range_from_row(row: &PgRow) -> Result<StoredRange> {
    let sex: String = row.try_get("sex")?;
    let sex = Sex::parse_token(&sex)
        .ok_or_else(|| Error::Internal(format!("unexpected sex {sex:?} in reference_ranges")))?;

    let age_unit: String = row.try_get("age_unit")?;
    let age_unit = AgeUnit::parse_token(&age_unit).ok_or_else(|| {
        Error::Internal(format!("unexpected age unit {age_unit:?} in reference_ranges"))
    })?;

    let value_kind: String = row.try_get("value_kind")?;
    let value_kind = ValueKind::parse(&value_kind).ok_or_else(|| {
        Error::Internal(format!("unexpected value kind {value_kind:?} in reference_ranges"))
    })?;

    Ok(StoredRange {
        id: row.try_get("id")?,
        parameter_id: row.try_get("parameter_id")?,
        content: RangeContent {
            sex,
            age_min: row.try_get("age_min")?,
            age_max: row.try_get("age_max")?,
            age_unit,
            value: RangeValue::from_columns(
                value_kind,
                row.try_get("lower_value")?,
                row.try_get("upper_value")?,
                row.try_get("text_value")?,
            ),
            notes: row.try_get("notes")?,
            unit: row.try_get("unit")?,
            method: row.try_get("method")?,
        },
    })
}

/// Bind the eleven content columns, in table order, after whatever the query
/// already bound.
pub(crate) fn bind_content<'q>(
    query: Query<'q, Postgres, PgArguments>,
    content: &'q RangeContent,
) -> Query<'q, Postgres, PgArguments> {
    query
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
        .bind(content.method.as_deref())
}
