//! Maintenance handlers

use axum::{extract::State, Json};
use labsync_ranges::AuditReport;

use crate::{db::RangeStore, state::AppState, Result};

/// `GET /admin/reference-ranges/audit`
pub async fn audit_ranges<S: RangeStore>(
    State(state): State<AppState<S>>,
) -> Result<Json<AuditReport>> {
    let report = state.audit_service.run().await?;
    Ok(Json(report))
}
