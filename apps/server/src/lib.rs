//! labsync - reference-range synchronization service
//!
//! Hosts the synchronization engine from `labsync-ranges` behind:
//! - PostgreSQL and in-memory range stores with per-parameter locking
//! - A persistence applier that writes each plan in one transaction
//! - Sync, listing and audit services
//! - An axum HTTP API with request ids, metrics and structured errors

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod startup;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};
pub use state::AppState;
