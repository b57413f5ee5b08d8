//! Request handlers for tracking, changes and writes.

mod changes;
mod tracking;
mod writes;

pub use changes::*;
pub use tracking::*;
pub use writes::*;
