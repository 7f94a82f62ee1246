//! Metrics API Routes
//!
//! Exposes Prometheus-compatible metrics endpoint for monitoring

use crate::api::handlers::metrics;
use crate::{db::RangeStore, state::AppState};
use axum::{routing::get, Router};

pub fn metrics_routes<S: RangeStore>() -> Router<AppState<S>> {
    Router::new().route("/metrics", get(metrics::metrics_handler))
}
