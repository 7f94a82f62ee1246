//! Reference-range routes

use crate::api::handlers::ranges;
use crate::{db::RangeStore, state::AppState};
use axum::{
    routing::{get, post},
    Router,
};

pub fn range_routes<S: RangeStore>() -> Router<AppState<S>> {
    Router::new()
        .route(
            "/parameters/:id/reference-ranges",
            get(ranges::list_ranges::<S>).put(ranges::sync_ranges::<S>),
        )
        .route(
            "/parameters/:id/reference-ranges/plan",
            post(ranges::plan_ranges::<S>),
        )
        .route(
            "/studies/:id/parameters/detailed",
            get(ranges::study_parameters_detailed::<S>),
        )
}
