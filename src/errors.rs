//! Crate-wide error type.
//!
//! One variant family per component, each wrapping a component-specific
//! sub-enum so callers can match on cause without losing context (the
//! failing parameter index, the endpoint that dropped out, ...). A single
//! [`convert`] function collapses non-`Error` failures crossing a router
//! boundary (Design Note "Error conversion").

use std::io;

use crate::value::Endpoint;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Internal(String),
}

/// I/O failures on a [`crate::transfer::Transfer`]. Routed through
/// `Session::handle_exception`, which decides reconnect vs. propagate (§4.1).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("short read on {endpoint}: expected {expected} bytes, got {actual}")]
    ShortRead {
        endpoint: Endpoint,
        expected: usize,
        actual: usize,
    },
    #[error("short write on {endpoint}: expected {expected} bytes, wrote {actual}")]
    ShortWrite {
        endpoint: Endpoint,
        expected: usize,
        actual: usize,
    },
    #[error("io error talking to {endpoint}: {source}")]
    Io {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },
}

/// Unexpected message shape on the wire; fatal to the command that hit it.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unexpected tag: expected {expected}, got {actual}")]
    UnexpectedTag { expected: &'static str, actual: u8 },
    #[error("command {id} used after close")]
    CommandClosed { id: i64 },
    #[error("getMetaData called on a non-query command {id}")]
    NotAQuery { id: i64 },
    #[error("command {id} was cancelled")]
    Cancelled { id: i64 },
}

/// `ClientCommandParameter` failures (§4.3).
#[derive(Debug, thiserror::Error)]
pub enum ParameterError {
    #[error("parameter {index} was not set")]
    NotSet { index: usize },
    #[error("parameter {index} already bound; pass close_old=true to rebind without closing it first")]
    PreviousValueNotClosed { index: usize },
}

/// Router-level cluster failures (§4.8, §7).
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("no live seed endpoint")]
    NoLiveSeed,
    #[error("partition resolver returned no live destination endpoints")]
    NoLiveDestinations,
    #[error("peer {endpoint} reported a failure: {reason}")]
    PeerFailed { endpoint: Endpoint, reason: String },
}

/// Peer session pool failures (§4.4).
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("no session interned for peer {endpoint}, nothing to cancel")]
    NoSession { endpoint: Endpoint },
}

/// Startup-time configuration failures (ambient stack, not part of §4-§8).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file '{path}': {source}")]
    Read { path: String, source: io::Error },
    #[error("could not parse config file '{path}': {reason}")]
    Parse { path: String, reason: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Centralizes conversion of non-`Error` failures (join errors from the
/// parallel executor, string reasons from collaborator traits) into `Error`
/// at every router boundary (Design Note "Error conversion").
pub fn convert<E: std::fmt::Display>(e: E) -> Error {
    Error::Internal(e.to_string())
}
