//! Internal maintenance routes, nested under `/admin`

use crate::api::handlers::audit;
use crate::{db::RangeStore, state::AppState};
use axum::{routing::get, Router};

pub fn admin_routes<S: RangeStore>() -> Router<AppState<S>> {
    Router::new().route("/reference-ranges/audit", get(audit::audit_ranges::<S>))
}
