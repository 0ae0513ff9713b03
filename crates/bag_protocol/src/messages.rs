//! Wire frames exchanged between clients and replica groups.
//!
//! Every request is one canonical CBOR array `[tag, timestamp, ...payload]`:
//!
//! | tag | name                | payload                                   |
//! |-----|---------------------|-------------------------------------------|
//! | 1   | `NODE_READ`         | one node identifier                       |
//! | 2   | `RELATIONSHIP_READ` | one relationship identifier               |
//! | 3   | `COMMIT`            | the eight transaction sets, node kind first |
//!
//! Within a commit each kind contributes `reads` (map), `updates` (map),
//! `deletes` (array) and `creates` (array), in that order. Canonical
//! encoding makes the bytes a pure function of the transaction, so every
//! replica that agrees on a frame agrees on its content.

use crate::error::{ProtocolError, ProtocolResult};
use bag_codec::{from_cbor, to_canonical_cbor, CodecError, CodecResult, Decode, Encode, Value};
use bag_core::{
    EntityKind, KindSets, NodeStorage, Operand, RelationshipStorage, Timestamp, TransactionState,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Message tag, the first element of every request frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestTag {
    /// Read of a node identifier.
    NodeRead,
    /// Read of a relationship identifier.
    RelationshipRead,
    /// Commit of a buffered transaction.
    Commit,
}

impl RequestTag {
    /// Wire code of this tag.
    pub fn code(self) -> i64 {
        match self {
            RequestTag::NodeRead => 1,
            RequestTag::RelationshipRead => 2,
            RequestTag::Commit => 3,
        }
    }

    /// Parses a wire code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(RequestTag::NodeRead),
            2 => Some(RequestTag::RelationshipRead),
            3 => Some(RequestTag::Commit),
            _ => None,
        }
    }

    /// Read tag for identifiers of `kind`.
    pub fn read_of(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Node => RequestTag::NodeRead,
            EntityKind::Relationship => RequestTag::RelationshipRead,
        }
    }
}

impl fmt::Display for RequestTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestTag::NodeRead => "NODE_READ",
            RequestTag::RelationshipRead => "RELATIONSHIP_READ",
            RequestTag::Commit => "COMMIT",
        })
    }
}

/// A decoded request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Resolve one identifier as of `timestamp`.
    Read {
        /// Snapshot to read at.
        timestamp: Timestamp,
        /// Identifier to resolve.
        identifier: Operand,
    },
    /// Validate and apply a transaction.
    Commit(TransactionState),
}

impl Request {
    /// Creates a read request.
    pub fn read(identifier: Operand, timestamp: Timestamp) -> Self {
        Request::Read {
            timestamp,
            identifier,
        }
    }

    /// Returns the tag of this request.
    pub fn tag(&self) -> RequestTag {
        match self {
            Request::Read { identifier, .. } => RequestTag::read_of(identifier.kind()),
            Request::Commit(_) => RequestTag::Commit,
        }
    }

    /// Returns the timestamp carried by this request.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Request::Read { timestamp, .. } => *timestamp,
            Request::Commit(txn) => txn.timestamp(),
        }
    }

    /// Encodes to a canonical CBOR frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut items = vec![
            Value::Integer(self.tag().code()),
            Value::Integer(self.timestamp().as_i64()),
        ];
        match self {
            Request::Read { identifier, .. } => items.push(identifier.to_value()),
            Request::Commit(txn) => {
                push_sets(&mut items, txn.nodes());
                push_sets(&mut items, txn.relationships());
            }
        }
        to_canonical_cbor(&Value::Array(items))
    }

    /// Decodes a frame.
    ///
    /// # Errors
    ///
    /// Fails on non-canonical bytes, unknown tags, wrong arity, a read
    /// identifier whose kind does not match its tag, or commit sets that
    /// both delete and write the same identifier.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let value = from_cbor(bytes)?;
        let items = value.expect_array()?;
        if items.len() < 2 {
            return Err(CodecError::invalid_structure("frame needs a tag and a timestamp").into());
        }
        let code = items[0].expect_integer()?;
        let tag = RequestTag::from_code(code).ok_or(ProtocolError::UnknownTag(code))?;
        let timestamp = Timestamp::new(items[1].expect_integer()?);
        let payload = &items[2..];

        match tag {
            RequestTag::NodeRead | RequestTag::RelationshipRead => {
                let [identifier] = payload else {
                    return Err(arity(tag, 1, payload.len()).into());
                };
                let identifier = Operand::from_value(identifier)?;
                if RequestTag::read_of(identifier.kind()) != tag {
                    return Err(ProtocolError::TagKindMismatch {
                        tag,
                        found: identifier.kind(),
                    });
                }
                Ok(Request::Read {
                    timestamp,
                    identifier,
                })
            }
            RequestTag::Commit => {
                if payload.len() != 8 {
                    return Err(arity(tag, 8, payload.len()).into());
                }
                let nodes = decode_sets::<NodeStorage>(&payload[..4])?;
                let relationships = decode_sets::<RelationshipStorage>(&payload[4..])?;
                Ok(Request::Commit(TransactionState::from_parts(
                    timestamp,
                    nodes,
                    relationships,
                )))
            }
        }
    }
}

/// Reads only the tag of a frame, for replying to frames that fail to
/// decode. Returns `None` if not even the tag can be read.
pub fn peek_tag(bytes: &[u8]) -> Option<RequestTag> {
    let value = from_cbor(bytes).ok()?;
    let code = value.as_array()?.first()?.as_integer()?;
    RequestTag::from_code(code)
}

fn arity(tag: RequestTag, expected: usize, found: usize) -> CodecError {
    CodecError::invalid_structure(format!(
        "{tag} frame needs {expected} payload items, found {found}"
    ))
}

fn push_sets<T>(items: &mut Vec<Value>, sets: &KindSets<T>)
where
    T: Encode + Ord + Clone + fmt::Display,
{
    items.push(map_value(sets.reads()));
    items.push(map_value(sets.updates()));
    items.push(Value::Array(sets.deletes().iter().map(Encode::to_value).collect()));
    items.push(Value::Array(sets.creates().iter().map(Encode::to_value).collect()));
}

fn map_value<T: Encode>(map: &BTreeMap<T, T>) -> Value {
    Value::map(
        map.iter()
            .map(|(key, value)| (key.to_value(), value.to_value()))
            .collect(),
    )
}

fn decode_map<T: Decode + Ord>(value: &Value) -> CodecResult<BTreeMap<T, T>> {
    value
        .expect_map()?
        .iter()
        .map(|(key, value)| Ok((T::from_value(key)?, T::from_value(value)?)))
        .collect()
}

fn decode_list<T: Decode>(value: &Value) -> CodecResult<Vec<T>> {
    value.expect_array()?.iter().map(T::from_value).collect()
}

fn decode_sets<T>(items: &[Value]) -> ProtocolResult<KindSets<T>>
where
    T: Decode + Ord + Clone + fmt::Display,
{
    let reads = decode_map(&items[0])?;
    let updates = decode_map(&items[1])?;
    let deletes: BTreeSet<T> = decode_list(&items[2])?.into_iter().collect();
    let creates = decode_list(&items[3])?;
    Ok(KindSets::from_parts(reads, updates, deletes, creates)?)
}

/// Outcome of a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// The transaction was applied.
    Commit,
    /// The transaction was rejected and had no effect.
    Abort,
}

impl Verdict {
    /// Wire name of this verdict.
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Commit => "commit",
            Verdict::Abort => "abort",
        }
    }

    /// Returns true for [`Verdict::Commit`].
    pub fn is_commit(self) -> bool {
        self == Verdict::Commit
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reply to a commit frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitResponse {
    /// The agreed outcome.
    pub verdict: Verdict,
    /// Highest committed timestamp at the replica.
    pub timestamp: Timestamp,
}

impl CommitResponse {
    /// Creates a commit reply.
    pub fn new(verdict: Verdict, timestamp: Timestamp) -> Self {
        Self { verdict, timestamp }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> Vec<u8> {
        to_canonical_cbor(&Value::map(vec![
            (Value::text("verdict"), Value::text(self.verdict.as_str())),
            (Value::text("timestamp"), Value::Integer(self.timestamp.as_i64())),
        ]))
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let value = from_cbor(bytes)?;
        let verdict = match value.field("verdict")?.expect_text()? {
            "commit" => Verdict::Commit,
            "abort" => Verdict::Abort,
            other => {
                return Err(CodecError::invalid_structure(format!("unknown verdict `{other}`")).into())
            }
        };
        let timestamp = Timestamp::new(value.field("timestamp")?.expect_integer()?);
        Ok(Self { verdict, timestamp })
    }
}

/// Reply to a read frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse {
    /// Kind of the identifier that was read.
    pub kind: EntityKind,
    /// Matching stored entities, with their meta properties.
    pub results: Vec<Operand>,
    /// Highest committed timestamp at the replica.
    pub timestamp: Timestamp,
}

impl ReadResponse {
    /// Creates a read reply.
    pub fn new(kind: EntityKind, results: Vec<Operand>, timestamp: Timestamp) -> Self {
        Self {
            kind,
            results,
            timestamp,
        }
    }

    /// A reply with no results.
    pub fn empty(kind: EntityKind, timestamp: Timestamp) -> Self {
        Self::new(kind, Vec::new(), timestamp)
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> Vec<u8> {
        to_canonical_cbor(&Value::map(vec![
            (Value::text("kind"), Value::Integer(self.kind.code())),
            (
                Value::text("results"),
                Value::Array(self.results.iter().map(Encode::to_value).collect()),
            ),
            (Value::text("timestamp"), Value::Integer(self.timestamp.as_i64())),
        ]))
    }

    /// Decodes from CBOR. Every result must be of the reply's kind.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let value = from_cbor(bytes)?;
        let code = value.field("kind")?.expect_integer()?;
        let kind = EntityKind::from_code(code)
            .ok_or_else(|| CodecError::invalid_structure(format!("unknown entity kind {code}")))?;
        let results = value
            .field("results")?
            .expect_array()?
            .iter()
            .map(|item| match kind {
                EntityKind::Node => NodeStorage::from_value(item).map(Operand::Node),
                EntityKind::Relationship => {
                    RelationshipStorage::from_value(item).map(Operand::Relationship)
                }
            })
            .collect::<CodecResult<Vec<_>>>()?;
        let timestamp = Timestamp::new(value.field("timestamp")?.expect_integer()?);
        Ok(Self {
            kind,
            results,
            timestamp,
        })
    }
}
