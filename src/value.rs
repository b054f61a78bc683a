//! Wire-level value types and the core data model shared by every component:
//! [`Endpoint`], [`Token`], [`SchemaRef`] and [`Row`].

use std::cmp::Ordering;
use std::fmt;
use std::net::SocketAddr;

use uuid::Uuid;

/// A network address for a cluster peer.
///
/// Total-ordered by bytes so logs and tie-break decisions (random peer pick,
/// sorted endpoint lists) are deterministic across a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    pub const fn new(addr: SocketAddr) -> Self {
        Endpoint(addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.0
    }
}

impl PartialOrd for Endpoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Endpoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.to_string().cmp(&other.0.to_string())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint(addr)
    }
}

/// An opaque, comparable partitioner output over partition-key bytes.
///
/// Stored as the raw `u64` the partitioner produces (xxh3 of the key bytes by
/// default, see [`crate::partition::Xxh3Partitioner`]); comparable so ring
/// lookups and test assertions can order tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u64);

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A key into token metadata for pending-endpoint lookups: `(schema-full-name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaRef {
    pub full_name: String,
}

impl SchemaRef {
    pub fn new(full_name: impl Into<String>) -> Self {
        SchemaRef {
            full_name: full_name.into(),
        }
    }
}

impl fmt::Display for SchemaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name)
    }
}

/// A single wire-level typed value, as framed by [`crate::transfer::Transfer`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Bytes(Vec<u8>),
    Str(String),
    Uuid(Uuid),
}

impl Value {
    /// Bytes a partitioner hashes to produce a [`Token`]. Every variant has a
    /// stable byte encoding so the same logical value always routes to the
    /// same token regardless of how it arrived on the wire.
    pub fn partition_key_bytes(&self) -> Vec<u8> {
        match self {
            Value::Null => Vec::new(),
            Value::Bool(b) => vec![*b as u8],
            Value::Int(i) => i.to_be_bytes().to_vec(),
            Value::Double(d) => d.to_be_bytes().to_vec(),
            Value::Bytes(b) => b.clone(),
            Value::Str(s) => s.as_bytes().to_vec(),
            Value::Uuid(u) => u.as_bytes().to_vec(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Bytes(b) => write!(f, "0x{}", hex_encode(b)),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Uuid(u) => write!(f, "{u}"),
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A data row as it flows through routing: `{ rowKey: Value?, columns: [Value] }`.
///
/// A `None` `row_key` observed at route time is replaced by a freshly
/// generated UUID before the row is hashed or dispatched; callers must use
/// the key that [`Row::ensure_row_key`] returns, since it is the same key
/// that will be stored and sent to peers (§3, Row invariant).
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub row_key: Option<Value>,
    pub columns: Vec<Value>,
}

impl Row {
    pub fn new(row_key: Option<Value>, columns: Vec<Value>) -> Self {
        Row { row_key, columns }
    }

    /// Returns the row's partition key, generating and persisting a fresh
    /// UUID into `self.row_key` if one is absent. The substitution is
    /// observable: the same UUID is what gets hashed into a token *and* what
    /// is stored in the row sent onward to peers.
    pub fn ensure_row_key(&mut self) -> &Value {
        if self.row_key.is_none() {
            self.row_key = Some(Value::Uuid(Uuid::new_v4()));
        }
        self.row_key.as_ref().expect("row_key set above")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_ordering_is_total_and_stable() {
        let a: Endpoint = "10.0.0.1:5432".parse::<SocketAddr>().unwrap().into();
        let b: Endpoint = "10.0.0.2:5432".parse::<SocketAddr>().unwrap().into();
        assert!(a < b);
        assert_eq!(a.cmp(&a), Ordering::Equal);
    }

    #[test]
    fn ensure_row_key_persists_generated_uuid() {
        let mut row = Row::new(None, vec![Value::Int(1)]);
        let first = row.ensure_row_key().clone();
        let second = row.ensure_row_key().clone();
        assert_eq!(first, second, "repeated calls must not regenerate the key");
        assert!(matches!(row.row_key, Some(Value::Uuid(_))));
    }

    #[test]
    fn existing_row_key_is_left_untouched() {
        let mut row = Row::new(Some(Value::Int(42)), vec![]);
        assert_eq!(row.ensure_row_key(), &Value::Int(42));
    }
}
