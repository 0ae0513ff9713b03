//! Client-side transaction state.
//!
//! A transaction buffers its effects per entity kind until commit:
//!
//! - `reads`: identifier to the value observed when it was read
//! - `updates`: identifier to its new value, last write wins
//! - `deletes`: identifiers to remove
//! - `creates`: values to insert, in application order
//!
//! Deleting an identifier discards any pending update or create for it, and
//! later writes to a deleted identifier are refused, so an identifier is
//! never both deleted and written within one transaction.

mod state;

pub use state::{KindSets, TransactionState};
