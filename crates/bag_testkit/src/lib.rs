//! # BAG Testkit
//!
//! Test utilities for BAG.
//!
//! This crate provides:
//! - Entity fixtures and pre-populated graphs
//! - Property-based test generators using proptest
//! - Temporary state directories for recovery tests

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

pub use fixtures::*;
pub use generators::*;
