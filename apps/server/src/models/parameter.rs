//! Lab parameters and the listing shapes built around them.

use chrono::{DateTime, Utc};
use labsync_ranges::{ParameterId, StoredRange};
use serde::Serialize;

/// A measurable laboratory parameter belonging to a study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterRecord {
    pub id: ParameterId,
    pub study_id: i64,
    pub name: String,
    pub unit: Option<String>,
    pub decimals: Option<i16>,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A parameter together with its deduplicated, age-sorted ranges.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterWithRanges {
    #[serde(flatten)]
    pub parameter: ParameterRecord,
    pub reference_ranges: Vec<StoredRange>,
}
