//! General configuration settings for the statement router node.

use std::collections::HashMap;
use std::net::SocketAddr;

use serde_derive::{Deserialize, Serialize};

use super::Duration;

/// General configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct General {
    /// The address this node advertises to peers and compares against
    /// `Membership::broadcast_address` (§3 "Endpoint").
    pub broadcast_address: SocketAddr,

    /// Address the client command channel listens on.
    #[serde(default = "General::default_listen_address")]
    pub listen_address: SocketAddr,

    /// Seed endpoints consulted for DDL seed election (§4.8, §6).
    #[serde(default)]
    pub seeds: Vec<SocketAddr>,

    /// Static endpoint → datacenter table for the snitch (§6 GLOSSARY
    /// "Datacenter"). Endpoints not listed fall back to `default_datacenter`.
    #[serde(default)]
    pub datacenters: HashMap<SocketAddr, String>,

    #[serde(default = "General::default_datacenter")]
    pub default_datacenter: String,

    /// `ServerCachedObjects` (§6): LRU-distance threshold a `ClientCommand`
    /// compares its handle id against before re-preparing.
    #[serde(default = "General::default_server_cached_objects")]
    pub server_cached_objects: i64,

    /// Default fetch size handed to peer `ClientCommand`s the router opens
    /// (§4.2, §6). `-1` means unbounded.
    #[serde(default = "General::default_fetch_size")]
    pub fetch_size: i64,

    #[serde(default = "General::default_connect_timeout")]
    pub connect_timeout: Duration,

    #[serde(default = "General::default_idle_timeout")]
    pub idle_timeout: Duration,

    #[serde(default = "General::default_worker_threads")]
    pub worker_threads: usize,

    /// Seed for the cluster-scoped tie-break RNG (§9 Design Note "Random
    /// tie-break"). Fixed in config so a restarted node's tie-break
    /// distribution is reproducible across a test run.
    #[serde(default = "General::default_tie_break_seed")]
    pub tie_break_seed: u64,

    /// Bind address for the Prometheus metrics endpoint. `None` disables it.
    #[serde(default)]
    pub metrics_address: Option<SocketAddr>,

    #[serde(default = "General::default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,
}

impl General {
    pub fn default_listen_address() -> SocketAddr {
        "0.0.0.0:9100".parse().unwrap()
    }

    pub fn default_datacenter() -> String {
        "dc1".to_string()
    }

    pub fn default_server_cached_objects() -> i64 {
        1000
    }

    pub fn default_fetch_size() -> i64 {
        -1
    }

    pub fn default_connect_timeout() -> Duration {
        Duration::from_secs(3)
    }

    pub fn default_idle_timeout() -> Duration {
        Duration::from_mins(5)
    }

    pub fn default_worker_threads() -> usize {
        4
    }

    pub fn default_tie_break_seed() -> u64 {
        0
    }

    pub fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for General {
    fn default() -> General {
        General {
            broadcast_address: "127.0.0.1:9100".parse().unwrap(),
            listen_address: Self::default_listen_address(),
            seeds: Vec::new(),
            datacenters: HashMap::new(),
            default_datacenter: Self::default_datacenter(),
            server_cached_objects: Self::default_server_cached_objects(),
            fetch_size: Self::default_fetch_size(),
            connect_timeout: Self::default_connect_timeout(),
            idle_timeout: Self::default_idle_timeout(),
            worker_threads: Self::default_worker_threads(),
            tie_break_seed: Self::default_tie_break_seed(),
            metrics_address: None,
            log_level: Self::default_log_level(),
            log_json: false,
        }
    }
}
