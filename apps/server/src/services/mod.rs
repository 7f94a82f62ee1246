//! Business logic services

pub mod applier;
pub mod audit;
pub mod listing;
pub mod sync;

pub use applier::{apply_plan, AppliedCounts};
pub use audit::RangeAuditService;
pub use listing::RangeListingService;
pub use sync::{PlanPreview, RangeSyncService, SyncOutcome, SyncSettings};
