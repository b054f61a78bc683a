//! Membership interface (§6) — consumed, not owned: gossip/failure-detection
//! lives outside this crate. `InMemoryMembership` is the reference
//! implementation used by tests and by a single-process deployment where
//! membership is configured rather than discovered.

use std::collections::HashSet;

use parking_lot::RwLock;

use crate::value::Endpoint;

pub trait Membership: Send + Sync {
    fn live_members(&self) -> HashSet<Endpoint>;
    fn first_live_seed_endpoint(&self) -> Option<Endpoint>;
    fn is_alive(&self, endpoint: Endpoint) -> bool;
    fn broadcast_address(&self) -> Endpoint;
}

/// Statically configured seed list plus a mutable live-set, swappable at
/// runtime for tests that simulate nodes going up/down.
pub struct InMemoryMembership {
    broadcast_address: Endpoint,
    seeds: Vec<Endpoint>,
    live: RwLock<HashSet<Endpoint>>,
}

impl InMemoryMembership {
    pub fn new(broadcast_address: Endpoint, seeds: Vec<Endpoint>, live: HashSet<Endpoint>) -> Self {
        InMemoryMembership {
            broadcast_address,
            seeds,
            live: RwLock::new(live),
        }
    }

    pub fn mark_down(&self, endpoint: Endpoint) {
        self.live.write().remove(&endpoint);
    }

    pub fn mark_up(&self, endpoint: Endpoint) {
        self.live.write().insert(endpoint);
    }
}

impl Membership for InMemoryMembership {
    fn live_members(&self) -> HashSet<Endpoint> {
        self.live.read().clone()
    }

    fn first_live_seed_endpoint(&self) -> Option<Endpoint> {
        let live = self.live.read();
        self.seeds.iter().find(|s| live.contains(s)).copied()
    }

    fn is_alive(&self, endpoint: Endpoint) -> bool {
        self.live.read().contains(&endpoint)
    }

    fn broadcast_address(&self) -> Endpoint {
        self.broadcast_address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn endpoint(port: u16) -> Endpoint {
        format!("127.0.0.1:{port}").parse::<SocketAddr>().unwrap().into()
    }

    #[test]
    fn first_live_seed_skips_down_seeds() {
        let seeds = vec![endpoint(1), endpoint(2)];
        let live = [endpoint(2)].into_iter().collect();
        let membership = InMemoryMembership::new(endpoint(9), seeds, live);
        assert_eq!(membership.first_live_seed_endpoint(), Some(endpoint(2)));
    }

    #[test]
    fn no_live_seed_returns_none() {
        let seeds = vec![endpoint(1)];
        let membership = InMemoryMembership::new(endpoint(9), seeds, HashSet::new());
        assert_eq!(membership.first_live_seed_endpoint(), None);
    }

    #[test]
    fn mark_down_is_observed_by_is_alive() {
        let membership = InMemoryMembership::new(endpoint(9), vec![], [endpoint(1)].into_iter().collect());
        assert!(membership.is_alive(endpoint(1)));
        membership.mark_down(endpoint(1));
        assert!(!membership.is_alive(endpoint(1)));
    }
}
