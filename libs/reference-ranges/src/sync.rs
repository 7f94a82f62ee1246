//! Entry point of a synchronization: request shape and the lock-free
//! preparation step (normalization and validation).

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::normalize::{
    normalize_all, NormalizationReport, NormalizeOptions, NormalizedDescriptor, RangeDescriptor,
};
use crate::validate::validate_intervals;

/// Body of a synchronization request.
///
/// `ranges` absent or `null` leaves stored data untouched; an empty list does
/// too unless `clearRanges` is set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    #[serde(default)]
    pub ranges: Option<Vec<RangeDescriptor>>,
    #[serde(default, alias = "clear_ranges")]
    pub clear_ranges: bool,
}

impl SyncRequest {
    pub fn descriptor_count(&self) -> usize {
        self.ranges.as_ref().map_or(0, Vec::len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncIntent {
    /// Leave stored rows as they are.
    Preserve,
    /// Delete every stored row of the parameter.
    ClearAll,
    /// Merge the descriptors into the stored rows. With `full_replace` every
    /// sex group counts as touched.
    Apply {
        descriptors: Vec<NormalizedDescriptor>,
        full_replace: bool,
    },
}

#[derive(Debug, Clone)]
pub struct PreparedSync {
    pub intent: SyncIntent,
    pub report: NormalizationReport,
}

impl PreparedSync {
    /// Whether the sync can skip the write path entirely.
    pub fn is_preserve(&self) -> bool {
        self.intent == SyncIntent::Preserve
    }
}

/// Normalize and validate a request. Does not need the stored rows, so it runs
/// before any lock is taken.
pub fn prepare(request: &SyncRequest, options: &NormalizeOptions) -> Result<PreparedSync> {
    let mut report = NormalizationReport::default();
    let intent = match request.ranges.as_deref() {
        None => SyncIntent::Preserve,
        Some([]) if request.clear_ranges => SyncIntent::ClearAll,
        Some([]) => SyncIntent::Preserve,
        Some(ranges) => {
            let descriptors = normalize_all(ranges, options, &mut report)?;
            validate_intervals(&descriptors)?;
            SyncIntent::Apply {
                descriptors,
                full_replace: request.clear_ranges,
            }
        }
    };
    Ok(PreparedSync { intent, report })
}
