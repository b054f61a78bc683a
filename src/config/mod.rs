//! Configuration for the statement router node.
//!
//! TOML file parsed into a [`Config`], validated, and published behind an
//! `ArcSwap` so every component reads a cheap snapshot (`get_config`)
//! instead of taking a lock (teacher's pattern, generalized from a
//! connection-pooler's config to this node's).

use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use serde_derive::{Deserialize, Serialize};
use tokio::fs;

use crate::errors::{ConfigError, Error};

mod duration;
mod general;

pub use duration::Duration;
pub use general::General;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static CONFIG: Lazy<ArcSwap<Config>> = Lazy::new(|| ArcSwap::from_pointee(Config::default()));

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "Config::default_path", skip_serializing_if = "String::is_empty")]
    pub path: String,

    pub general: General,
}

impl Config {
    pub fn default_path() -> String {
        String::from("shardrouter.toml")
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            path: Self::default_path(),
            general: General::default(),
        }
    }
}

impl Config {
    /// Logs the effective configuration at startup.
    pub fn show(&self) {
        tracing::info!(
            broadcast_address = %self.general.broadcast_address,
            listen_address = %self.general.listen_address,
            seeds = ?self.general.seeds,
            server_cached_objects = self.general.server_cached_objects,
            fetch_size = self.general.fetch_size,
            worker_threads = self.general.worker_threads,
            "loaded configuration"
        );
    }

    /// Checks cross-field invariants the type system can't express.
    pub fn validate(&self) -> Result<(), Error> {
        if self.general.server_cached_objects < 0 {
            return Err(ConfigError::Invalid(
                "general.server_cached_objects must be >= 0".to_string(),
            )
            .into());
        }
        if self.general.worker_threads == 0 {
            return Err(ConfigError::Invalid("general.worker_threads must be >= 1".to_string()).into());
        }
        if self.general.seeds.iter().any(|s| *s == self.general.broadcast_address)
            && self.general.seeds.len() == 1
        {
            // A single-node cluster seeding itself is fine; multi-seed
            // configs always need at least one reachable other member.
            tracing::debug!("single-node cluster: broadcast_address is its own seed");
        }
        Ok(())
    }
}

/// Cheap snapshot of the current configuration. `ArcSwap` makes this a
/// single atomic load, not a lock.
pub fn get_config() -> Arc<Config> {
    CONFIG.load_full()
}

async fn load_file(path: &str) -> Result<String, Error> {
    fs::read_to_string(path).await.map_err(|source| {
        ConfigError::Read {
            path: path.to_string(),
            source,
        }
        .into()
    })
}

/// Parses and validates the TOML file at `path`, then publishes it globally.
pub async fn parse(path: &str) -> Result<(), Error> {
    let contents = load_file(path).await?;
    let mut config: Config = toml::from_str(&contents).map_err(|err| ConfigError::Parse {
        path: path.to_string(),
        reason: err.to_string(),
    })?;
    config.path = path.to_string();
    config.validate()?;
    CONFIG.store(Arc::new(config));
    Ok(())
}
