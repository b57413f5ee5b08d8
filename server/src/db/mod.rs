//! Database module for the Postgres tracking host.

pub mod catalog;
pub mod log;
mod pool;
pub mod provision;
pub mod sql;
pub mod triggers;
pub mod writes;

pub use pool::*;
