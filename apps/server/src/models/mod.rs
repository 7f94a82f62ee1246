//! Domain models for the reference-range service

pub mod parameter;

pub use parameter::{ParameterRecord, ParameterWithRanges};
