//! Metric configuration: YAML schema, substitution, validation and loading.
//!
//! This crate provides:
//! - `${NAME}` environment substitution and minijinja templating
//! - The `MetricDocument` schema and the validated `MetricUnit`
//! - Structural validation with path-qualified errors
//! - A filesystem loader for single files and directories

pub mod error;
pub mod loader;
pub mod schedule;
pub mod schema;
pub mod substitution;
pub mod template;
pub mod timestamp;
pub mod validation;

pub use error::{ConfigError, LoadResult, LoadStatus};
pub use loader::{ConfigLoader, LoadedDirectory};
pub use schema::{BacktestPlan, DetectorConfig, MetricDocument, MetricUnit, PluginSpec, StorageSpec};
pub use template::{TemplateContext, TemplateRenderer};
