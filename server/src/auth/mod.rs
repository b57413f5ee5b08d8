//! Authentication for the admin routes.

mod middleware;

pub use middleware::*;
