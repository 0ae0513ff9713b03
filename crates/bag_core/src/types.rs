//! Core type definitions for BAG.

use std::fmt;

/// Logical version marker of a transaction.
///
/// A transaction reads as of its timestamp and every record it writes is
/// stamped with it, so a read at `T` only sees writes stamped `<= T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// The timestamp before any transaction.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Creates a new timestamp.
    #[must_use]
    pub const fn new(ts: i64) -> Self {
        Self(ts)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Returns the next timestamp.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ts:{}", self.0)
    }
}
