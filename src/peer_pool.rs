//! Peer Session Pool (Component D).
//!
//! Interns one [`PeerSession`] per `(origin, peer)` pair so repeated
//! forwarding from the same origin session to the same peer reuses a single
//! [`Transfer`]/[`Session`] instead of reconnecting per statement (mirrors
//! the source's pool-of-pools keyed-interning pattern, generalized from a
//! single global map to one pool per connector).
//!
//! Creation is memoized per key with [`tokio::sync::OnceCell`] behind a
//! [`DashMap`] entry so two concurrent lookups for the same key never open
//! two connections, without holding the map's shard lock across an `.await`.

use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex as AsyncMutex, OnceCell};

use crate::errors::{Error, PoolError};
use crate::session::Session;
use crate::transfer::Transfer;
use crate::value::Endpoint;

/// Identifies one interned peer connection: the session this node presents
/// itself under (so the peer can attribute/route replies) and the peer being
/// talked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerSessionKey {
    pub origin: Endpoint,
    pub peer: Endpoint,
}

/// Establishes the transport for a new peer connection. Production wiring
/// supplies a `TcpStream`-backed implementation; tests supply an in-memory
/// one (see `crate::test_support`).
#[async_trait]
pub trait PeerConnector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn connect(&self, peer: Endpoint) -> Result<Self::Stream, Error>;
}

/// Production [`PeerConnector`]: a plain TCP dial with a connect timeout
/// (§6 "peer session pool").
pub struct TcpPeerConnector {
    connect_timeout: std::time::Duration,
}

impl TcpPeerConnector {
    pub fn new(connect_timeout: std::time::Duration) -> Self {
        TcpPeerConnector { connect_timeout }
    }
}

#[async_trait]
impl PeerConnector for TcpPeerConnector {
    type Stream = tokio::net::TcpStream;

    async fn connect(&self, peer: Endpoint) -> Result<Self::Stream, Error> {
        let stream = tokio::time::timeout(self.connect_timeout, tokio::net::TcpStream::connect(peer.addr()))
            .await
            .map_err(|_| Error::Transport(crate::errors::TransportError::Io {
                endpoint: peer,
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
            }))?
            .map_err(|source| Error::Transport(crate::errors::TransportError::Io { endpoint: peer, source }))?;
        stream.set_nodelay(true).ok();
        Ok(stream)
    }
}

/// One live connection to a peer: a shared, lockable `Transfer` and the
/// `Session` tracking its prepared-statement ids and reconnect epoch.
pub struct PeerSession<S> {
    pub transfer: Arc<AsyncMutex<Transfer<S>>>,
    pub session: Arc<Session>,
}

/// Pool of interned [`PeerSession`]s for one connector/stream type.
pub struct PeerSessionPool<C: PeerConnector> {
    connector: C,
    sessions: DashMap<PeerSessionKey, Arc<OnceCell<Arc<PeerSession<C::Stream>>>>>,
}

impl<C: PeerConnector> PeerSessionPool<C> {
    pub fn new(connector: C) -> Self {
        PeerSessionPool {
            connector,
            sessions: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Returns the interned session for `key`, connecting on first use.
    pub async fn get_or_connect(
        &self,
        key: PeerSessionKey,
    ) -> Result<Arc<PeerSession<C::Stream>>, Error> {
        let cell = self
            .sessions
            .entry(key)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        cell.get_or_try_init(|| async {
            let stream = self.connector.connect(key.peer).await?;
            let transfer = Arc::new(AsyncMutex::new(Transfer::new(stream, key.peer)));
            let session = Arc::new(Session::new());
            Ok::<_, Error>(Arc::new(PeerSession { transfer, session }))
        })
        .await
        .cloned()
    }

    /// Drops an interned session, e.g. after the peer was marked down by
    /// membership or the connection failed irrecoverably. The next
    /// `get_or_connect` for this key reconnects.
    pub fn evict(&self, key: &PeerSessionKey) {
        if let Some((_, cell)) = self.sessions.remove(key) {
            if let Some(peer_session) = cell.get() {
                peer_session.session.close();
            }
        }
    }

    /// Routes a cancellation onto the peer session interned for `key`,
    /// without dialing a new connection just to cancel nothing. The session
    /// must already be connected (`get_or_connect` must have run at least
    /// once for this key) or there is nothing in flight to cancel.
    pub fn cancel_if_present(&self, key: PeerSessionKey, id: i64) -> Result<(), Error> {
        let cell = self
            .sessions
            .get(&key)
            .ok_or(PoolError::NoSession { endpoint: key.peer })?;
        let peer_session = cell
            .get()
            .ok_or(PoolError::NoSession { endpoint: key.peer })?;
        peer_session.session.cancel_statement(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::DuplexStream;

    struct CountingConnector {
        connects: AtomicUsize,
    }

    #[async_trait]
    impl PeerConnector for CountingConnector {
        type Stream = DuplexStream;

        async fn connect(&self, _peer: Endpoint) -> Result<Self::Stream, Error> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let (a, _b) = tokio::io::duplex(4096);
            Ok(a)
        }
    }

    fn endpoint(port: u16) -> Endpoint {
        format!("127.0.0.1:{port}")
            .parse::<SocketAddr>()
            .unwrap()
            .into()
    }

    #[tokio::test]
    async fn same_key_reuses_one_connection() {
        let pool = PeerSessionPool::new(CountingConnector {
            connects: AtomicUsize::new(0),
        });
        let key = PeerSessionKey {
            origin: endpoint(1),
            peer: endpoint(2),
        };
        let a = pool.get_or_connect(key).await.unwrap();
        let b = pool.get_or_connect(key).await.unwrap();
        assert!(Arc::ptr_eq(&a.session, &b.session));
        assert_eq!(pool.connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_get_distinct_sessions() {
        let pool = PeerSessionPool::new(CountingConnector {
            connects: AtomicUsize::new(0),
        });
        let k1 = PeerSessionKey {
            origin: endpoint(1),
            peer: endpoint(2),
        };
        let k2 = PeerSessionKey {
            origin: endpoint(1),
            peer: endpoint(3),
        };
        let a = pool.get_or_connect(k1).await.unwrap();
        let b = pool.get_or_connect(k2).await.unwrap();
        assert!(!Arc::ptr_eq(&a.session, &b.session));
        assert_eq!(pool.len(), 2);
    }

    #[tokio::test]
    async fn evict_forces_a_fresh_connection() {
        let pool = PeerSessionPool::new(CountingConnector {
            connects: AtomicUsize::new(0),
        });
        let key = PeerSessionKey {
            origin: endpoint(1),
            peer: endpoint(2),
        };
        let first = pool.get_or_connect(key).await.unwrap();
        pool.evict(&key);
        assert!(first.session.is_closed());
        let second = pool.get_or_connect(key).await.unwrap();
        assert!(!Arc::ptr_eq(&first.session, &second.session));
        assert_eq!(pool.connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancel_if_present_marks_the_right_peer_session() {
        let pool = PeerSessionPool::new(CountingConnector {
            connects: AtomicUsize::new(0),
        });
        let k1 = PeerSessionKey {
            origin: endpoint(1),
            peer: endpoint(2),
        };
        let k2 = PeerSessionKey {
            origin: endpoint(1),
            peer: endpoint(3),
        };
        let a = pool.get_or_connect(k1).await.unwrap();
        let b = pool.get_or_connect(k2).await.unwrap();

        pool.cancel_if_present(k1, 42).unwrap();

        assert!(a.session.is_cancelled(42));
        assert!(!b.session.is_cancelled(42));
    }

    #[tokio::test]
    async fn cancel_if_present_with_no_interned_session_is_an_error() {
        let pool = PeerSessionPool::new(CountingConnector {
            connects: AtomicUsize::new(0),
        });
        let key = PeerSessionKey {
            origin: endpoint(1),
            peer: endpoint(2),
        };
        let err = pool.cancel_if_present(key, 42).unwrap_err();
        assert!(matches!(err, Error::Pool(crate::errors::PoolError::NoSession { .. })));
    }
}
