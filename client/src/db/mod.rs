//! Database module for SQLite persistence.

mod migrate;
mod mutations;
mod pool;
mod sync_state;

pub use migrate::*;
pub use mutations::*;
pub use pool::*;
pub use sync_state::*;
