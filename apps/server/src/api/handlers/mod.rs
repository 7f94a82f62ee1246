//! HTTP request handlers

pub mod audit;
pub mod metrics;
pub mod ranges;
