//! Built-in collectors.

mod constant;
mod http;
mod sequence;

pub use constant::ConstantCollector;
pub use http::HttpCollector;
pub use sequence::SequenceCollector;
