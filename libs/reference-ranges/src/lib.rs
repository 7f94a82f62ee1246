//! Reference-range synchronization engine for laboratory parameters.
//!
//! The crate is storage-agnostic. A sync runs in two halves:
//!
//! 1. [`prepare`] normalizes and validates a client payload. It needs nothing
//!    but the payload, so callers run it before taking any lock.
//! 2. [`plan_sync`] diffs the prepared payload against a snapshot of the stored
//!    rows and returns a [`SyncPlan`] of deletes, updates and inserts, with gap
//!    placeholders and synthetic fallback rows already worked in.
//!
//! Applying the plan atomically is the caller's job.
//!
//! ```
//! use labsync_ranges::{plan_sync, prepare, ExistingState, NormalizeOptions, PlanOptions, SyncRequest};
//!
//! let request: SyncRequest = serde_json::from_str(
//!     r#"{"ranges": [{"sex": "Ambos", "ageMin": 0, "ageMax": 17, "lower": 4.5, "upper": 11}]}"#,
//! ).unwrap();
//! let prepared = prepare(&request, &NormalizeOptions::default()).unwrap();
//! let plan = plan_sync(&prepared, &ExistingState::default(), &PlanOptions::default());
//!
//! // The real row plus one placeholder for ages 18..120.
//! assert_eq!(plan.inserts.len(), 2);
//! assert_eq!(plan.summary.placeholders_inserted, 1);
//! ```

pub mod age;
pub mod audit;
pub mod dedup;
pub mod error;
mod fallback;
pub mod gap_fill;
pub mod model;
pub mod normalize;
pub mod plan;
pub mod sync;
pub mod validate;

pub use audit::{audit, AuditFinding, AuditReport};
pub use dedup::{dedup_sorted, partition_duplicates, sort_for_display, Deduplicated};
pub use error::{RangeError, Result};
pub use model::{
    AgeUnit, ParameterId, RangeContent, RangeId, RangeValue, RowKind, Sex, StoredRange, ValueKind,
    AUTO_FILL_NOTE, NO_REFERENCE_NOTE,
};
pub use normalize::{
    NormalizationNote, NormalizationReport, NormalizeOptions, RangeDescriptor, SexPolicy,
};
pub use plan::{plan_sync, ExistingState, PlanOptions, PlanSummary, RangeUpdate, SyncPlan};
pub use sync::{prepare, PreparedSync, SyncIntent, SyncRequest};
