//! Core types and plugin contracts for metric monitoring.
//!
//! This crate provides:
//! - The data model shared by every stage (`DataPoint`, `DetectionResult`, `CheckResult`)
//! - Deterministic detector identity (`identity`)
//! - Window expressions and their resolution to query ranges (`window`)
//! - Async plugin contracts for collectors, storages, detectors and alerters (`traits`)
//! - An explicit, non-global plugin registry (`registry`)

pub mod error;
pub mod identity;
pub mod models;
pub mod registry;
pub mod traits;
pub mod window;

pub use error::{PluginError, Stage, StageFailure, StageResult, WindowError};
pub use models::{
    parse_params, CheckResult, CleanupCounts, DataPoint, DetectionRecord, DetectionResult,
    Direction, Params, RetentionPolicy,
};
pub use registry::{PluginRegistry, PluginRole, RegistryError};
pub use traits::{
    AlertOutcome, Alerter, BulkCollector, Collector, Detector, Storage, StorageIntrospection,
};
pub use window::{Window, WindowRange};
