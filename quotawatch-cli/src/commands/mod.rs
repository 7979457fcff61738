//! CLI command implementations.

pub mod plans;
pub mod summary;
pub mod watch;
