//! Network state tracking.

mod observer;
mod probe;

pub use observer::*;
pub use probe::HttpProbe;
