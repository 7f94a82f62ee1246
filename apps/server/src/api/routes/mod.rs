//! Route tables

pub mod admin;
pub mod metrics;
pub mod ranges;
