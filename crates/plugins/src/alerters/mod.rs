//! Built-in alerters.

mod log;
mod message;
mod webhook;

pub use log::LogAlerter;
pub use message::MessageFormatter;
pub use webhook::{CooldownLedger, WebhookAlerter};
