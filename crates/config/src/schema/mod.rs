//! Metric configuration schema.
//!
//! [`MetricDocument`] mirrors the YAML file as written. Validation turns it
//! into an immutable [`MetricUnit`] with resolved detector ids.

mod document;
mod unit;

pub use document::*;
pub use unit::*;
