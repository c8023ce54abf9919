//! Metric check orchestration.
//!
//! - [`Checker`]: one pipeline invocation (collect, persist, detect, alert, record)
//! - [`Backtester`]: the same pipeline replayed across historical time
//! - [`UnitScheduler`]: cron bookkeeping for live runs

pub mod backtest;
pub mod checker;
pub mod scheduler;
pub mod source;

pub use backtest::{BacktestReport, Backtester, SummaryRow};
pub use checker::{alert_reason, Checker, REQUIRED_TABLES};
pub use scheduler::{UnitScheduleEntry, UnitScheduler};
pub use source::ConfigSource;
