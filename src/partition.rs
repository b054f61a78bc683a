//! Partition resolver (Component E).
//!
//! Maps a statement's extracted equality filter to the set of endpoints
//! that own its partition key: hash the key bytes to a [`Token`], then ask
//! replication/token-metadata collaborators for the natural and pending
//! owners (§4.5).

use crate::session::TopFilter;
use crate::value::{Endpoint, SchemaRef, Token};

/// Hashes partition-key bytes to a ring position. Default implementation
/// uses `xxhash-rust`'s xxh3, standing in for the source's murmur3 (same
/// role: a fast, well-distributed, non-cryptographic hash over arbitrary
/// key bytes).
pub trait Partitioner: Send + Sync {
    fn get_token(&self, key_bytes: &[u8]) -> Token;
}

/// Default `xxh3`-backed partitioner.
#[derive(Debug, Default, Clone, Copy)]
pub struct Xxh3Partitioner;

impl Partitioner for Xxh3Partitioner {
    fn get_token(&self, key_bytes: &[u8]) -> Token {
        Token(xxhash_rust::xxh3::xxh3_64(key_bytes))
    }
}

/// Replica placement for a token under the current topology.
pub trait Replication: Send + Sync {
    fn natural_endpoints(&self, schema: &SchemaRef, token: Token) -> Vec<Endpoint>;
}

/// Replicas mid-transition (topology change in progress) for a token.
pub trait TokenMetadata: Send + Sync {
    fn pending_endpoints_for(&self, token: Token, schema_full_name: &str) -> Vec<Endpoint>;
}

impl<T: Replication + ?Sized> Replication for std::sync::Arc<T> {
    fn natural_endpoints(&self, schema: &SchemaRef, token: Token) -> Vec<Endpoint> {
        self.as_ref().natural_endpoints(schema, token)
    }
}

impl<T: TokenMetadata + ?Sized> TokenMetadata for std::sync::Arc<T> {
    fn pending_endpoints_for(&self, token: Token, schema_full_name: &str) -> Vec<Endpoint> {
        self.as_ref().pending_endpoints_for(token, schema_full_name)
    }
}

/// Fallback replication for deployments with no real topology/gossip
/// service plugged in (§1 Non-goals: no topology management in this
/// crate). Every token resolves to the full configured member list —
/// correct only for a single-node cluster or a fixed, unchanging member
/// set; production clusters should supply a real [`Replication`]
/// implementation sourced from their topology service instead.
pub struct StaticMemberReplication {
    members: Vec<Endpoint>,
}

impl StaticMemberReplication {
    pub fn new(members: Vec<Endpoint>) -> Self {
        StaticMemberReplication { members }
    }
}

impl Replication for StaticMemberReplication {
    fn natural_endpoints(&self, _schema: &SchemaRef, _token: Token) -> Vec<Endpoint> {
        self.members.clone()
    }
}

/// No topology changes in flight, ever. Pairs with [`StaticMemberReplication`]
/// for the same fallback deployment mode.
pub struct NoPendingRanges;

impl TokenMetadata for NoPendingRanges {
    fn pending_endpoints_for(&self, _token: Token, _schema_full_name: &str) -> Vec<Endpoint> {
        Vec::new()
    }
}

/// Resolves a statement's top filter to destination endpoints, or `None`
/// when no partition key can be extracted (caller then fans out to all live
/// members).
pub struct PartitionResolver<P, R, T> {
    partitioner: P,
    replication: R,
    token_metadata: T,
}

impl<P, R, T> PartitionResolver<P, R, T>
where
    P: Partitioner,
    R: Replication,
    T: TokenMetadata,
{
    pub fn new(partitioner: P, replication: R, token_metadata: T) -> Self {
        PartitionResolver {
            partitioner,
            replication,
            token_metadata,
        }
    }

    /// `natural` endpoints first, then `pending`; duplicates permitted
    /// (operationally rare, §4.5) and resolved by the caller's live-member
    /// filter/dedup step.
    pub fn targets_if_equal(&self, filter: &TopFilter, schema: &SchemaRef) -> Option<Vec<Endpoint>> {
        let literal = filter.equality_literal.as_ref()?;
        let token = self.partitioner.get_token(&literal.partition_key_bytes());
        let mut targets = self.replication.natural_endpoints(schema, token);
        targets.extend(self.token_metadata.pending_endpoints_for(token, &schema.full_name));
        Some(targets)
    }

    pub fn token_for(&self, key_bytes: &[u8]) -> Token {
        self.partitioner.get_token(key_bytes)
    }

    pub fn destinations_for_token(&self, schema: &SchemaRef, token: Token) -> Vec<Endpoint> {
        let mut targets = self.replication.natural_endpoints(schema, token);
        targets.extend(self.token_metadata.pending_endpoints_for(token, &schema.full_name));
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::net::SocketAddr;

    struct FixedReplication(Vec<Endpoint>);
    impl Replication for FixedReplication {
        fn natural_endpoints(&self, _schema: &SchemaRef, _token: Token) -> Vec<Endpoint> {
            self.0.clone()
        }
    }

    struct FixedPending(Vec<Endpoint>);
    impl TokenMetadata for FixedPending {
        fn pending_endpoints_for(&self, _token: Token, _schema_full_name: &str) -> Vec<Endpoint> {
            self.0.clone()
        }
    }

    fn endpoint(port: u16) -> Endpoint {
        format!("127.0.0.1:{port}").parse::<SocketAddr>().unwrap().into()
    }

    #[test]
    fn no_equality_literal_yields_none() {
        let resolver = PartitionResolver::new(
            Xxh3Partitioner,
            FixedReplication(vec![endpoint(1)]),
            FixedPending(vec![]),
        );
        let filter = TopFilter::default();
        let schema = SchemaRef::new("t");
        assert!(resolver.targets_if_equal(&filter, &schema).is_none());
    }

    #[test]
    fn natural_precedes_pending() {
        let resolver = PartitionResolver::new(
            Xxh3Partitioner,
            FixedReplication(vec![endpoint(1), endpoint(2)]),
            FixedPending(vec![endpoint(3)]),
        );
        let filter = TopFilter {
            equality_literal: Some(Value::Int(42)),
        };
        let schema = SchemaRef::new("t");
        let targets = resolver.targets_if_equal(&filter, &schema).unwrap();
        assert_eq!(targets, vec![endpoint(1), endpoint(2), endpoint(3)]);
    }

    #[test]
    fn same_key_hashes_to_same_token() {
        let p = Xxh3Partitioner;
        assert_eq!(p.get_token(b"abc"), p.get_token(b"abc"));
        assert_ne!(p.get_token(b"abc"), p.get_token(b"abd"));
    }
}
