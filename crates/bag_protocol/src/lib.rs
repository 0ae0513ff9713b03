//! # BAG Protocol
//!
//! Wire frames and the consensus transport contract for BAG.
//!
//! Clients and replicas only exchange opaque byte frames through a
//! [`ConsensusTransport`]; this crate defines their canonical CBOR layout:
//! - [`Request`]: node/relationship reads and transaction commits
//! - [`CommitResponse`]: the agreed verdict
//! - [`ReadResponse`]: the entities a replica resolved

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod messages;
mod transport;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{peek_tag, CommitResponse, ReadResponse, Request, RequestTag, Verdict};
pub use transport::{ConsensusTransport, Delivery, MockTransport};
