//! Built-in storages.

mod jsonl;
mod memory;

pub use jsonl::{JsonlStorage, DATAPOINTS_TABLE, DETECTIONS_TABLE};
pub use memory::{MemoryStorage, MemoryStore};
