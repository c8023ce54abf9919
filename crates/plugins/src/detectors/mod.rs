//! Built-in detectors. None of them implement statistical models.

mod missing_data;
mod percent_change;
mod threshold;

pub use missing_data::MissingDataDetector;
pub use percent_change::PercentChangeDetector;
pub use threshold::ThresholdDetector;
