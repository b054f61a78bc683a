//! Endpoint topology snitch (§6) — maps an endpoint to its datacenter.
//! Row routing buckets remote-DC traffic separately from local-DC traffic
//! using this (§4.8, GLOSSARY "Datacenter").

use std::collections::HashMap;

use crate::value::Endpoint;

pub trait Snitch: Send + Sync {
    fn datacenter(&self, endpoint: Endpoint) -> String;
}

/// Static endpoint → datacenter table, with a configurable default for
/// endpoints not explicitly listed.
pub struct StaticSnitch {
    table: HashMap<Endpoint, String>,
    default_dc: String,
}

impl StaticSnitch {
    pub fn new(table: HashMap<Endpoint, String>, default_dc: impl Into<String>) -> Self {
        StaticSnitch {
            table,
            default_dc: default_dc.into(),
        }
    }
}

impl Snitch for StaticSnitch {
    fn datacenter(&self, endpoint: Endpoint) -> String {
        self.table
            .get(&endpoint)
            .cloned()
            .unwrap_or_else(|| self.default_dc.clone())
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
    fn known_endpoint_returns_its_dc() {
        let mut table = HashMap::new();
        table.insert(endpoint(1), "dc-a".to_string());
        let snitch = StaticSnitch::new(table, "dc-b");
        assert_eq!(snitch.datacenter(endpoint(1)), "dc-a");
    }

    #[test]
    fn unknown_endpoint_falls_back_to_default() {
        let snitch = StaticSnitch::new(HashMap::new(), "dc-b");
        assert_eq!(snitch.datacenter(endpoint(2)), "dc-b");
    }
}
