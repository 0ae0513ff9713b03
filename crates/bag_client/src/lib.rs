//! # BAG Client
//!
//! Client side of BAG transactions.
//!
//! This crate provides:
//! - [`TransactionBuffer`]: per-kind read, update, delete and create sets
//! - [`BagClient`]: read-through reads, buffered writes and commit through
//!   a [`bag_protocol::ConsensusTransport`]
//!
//! ## Transaction lifecycle
//!
//! 1. Reads are sent immediately as unordered requests; results become the
//!    transaction's read evidence
//! 2. Writes are buffered locally; kind errors never leave the client
//! 3. Commit sends everything as one ordered request, unless the
//!    transaction only read and secure mode is off
//! 4. The agreed verdict is final; the buffer starts over

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod buffer;
mod client;
mod config;
mod error;

pub use buffer::TransactionBuffer;
pub use client::{BagClient, ClientStats};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
