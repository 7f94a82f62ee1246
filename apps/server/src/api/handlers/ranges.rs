//! Reference-range handlers: sync, dry run, listings

use axum::{extract::State, Json};
use labsync_ranges::{StoredRange, SyncRequest};

use crate::{
    api::extractors::{IdPath, JsonBody},
    db::RangeStore,
    models::ParameterWithRanges,
    services::{PlanPreview, SyncOutcome},
    state::AppState,
    Result,
};

/// `PUT /parameters/:id/reference-ranges`
pub async fn sync_ranges<S: RangeStore>(
    State(state): State<AppState<S>>,
    IdPath(parameter_id): IdPath,
    JsonBody(request): JsonBody<SyncRequest>,
) -> Result<Json<SyncOutcome>> {
    let outcome = state.sync_service.sync(parameter_id, &request).await?;
    Ok(Json(outcome))
}

/// `POST /parameters/:id/reference-ranges/plan`
pub async fn plan_ranges<S: RangeStore>(
    State(state): State<AppState<S>>,
    IdPath(parameter_id): IdPath,
    JsonBody(request): JsonBody<SyncRequest>,
) -> Result<Json<PlanPreview>> {
    let preview = state.sync_service.plan(parameter_id, &request).await?;
    Ok(Json(preview))
}

/// `GET /parameters/:id/reference-ranges`
pub async fn list_ranges<S: RangeStore>(
    State(state): State<AppState<S>>,
    IdPath(parameter_id): IdPath,
) -> Result<Json<Vec<StoredRange>>> {
    let ranges = state.listing_service.list(parameter_id).await?;
    Ok(Json(ranges))
}

/// `GET /studies/:id/parameters/detailed`
pub async fn study_parameters_detailed<S: RangeStore>(
    State(state): State<AppState<S>>,
    IdPath(study_id): IdPath,
) -> Result<Json<Vec<ParameterWithRanges>>> {
    let parameters = state.listing_service.study_detailed(study_id).await?;
    Ok(Json(parameters))
}
