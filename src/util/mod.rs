//! Utility modules for perfcollector.

mod duration;
mod hostname;

pub use duration::{DurationParseError, parse_duration};
pub use hostname::resolve_host;
