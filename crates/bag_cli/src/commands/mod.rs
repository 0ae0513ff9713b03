//! CLI command implementations.

pub mod control;
pub mod recover;
pub mod serve;
