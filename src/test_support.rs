//! In-memory fakes for the router's external collaborators, used only by
//! `#[cfg(test)]` code across the crate.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::DuplexStream;

use crate::errors::Error;
use crate::membership::Membership;
use crate::partition::{Replication, TokenMetadata};
use crate::peer_pool::PeerConnector;
use crate::result::{BufferedResult, OrderBy, RowResult};
use crate::router::{StatementFactory, TieBreak};
use crate::session::{Statement, TopFilter};
use crate::topology::Snitch;
use crate::value::{Endpoint, Row, SchemaRef, Value};

#[derive(Default)]
pub struct FakeConnector;

#[async_trait]
impl PeerConnector for FakeConnector {
    type Stream = DuplexStream;

    async fn connect(&self, _peer: Endpoint) -> Result<Self::Stream, Error> {
        let (a, _b) = tokio::io::duplex(4096);
        Ok(a)
    }
}

pub struct FakeMembership {
    broadcast_address: Endpoint,
    seeds: Vec<Endpoint>,
    live: HashSet<Endpoint>,
}

impl FakeMembership {
    pub fn new(broadcast_address: Endpoint, seeds: Vec<Endpoint>, live: HashSet<Endpoint>) -> Self {
        FakeMembership {
            broadcast_address,
            seeds,
            live,
        }
    }
}

impl Membership for FakeMembership {
    fn live_members(&self) -> HashSet<Endpoint> {
        self.live.clone()
    }

    fn first_live_seed_endpoint(&self) -> Option<Endpoint> {
        self.seeds.iter().find(|s| self.live.contains(s)).copied()
    }

    fn is_alive(&self, endpoint: Endpoint) -> bool {
        self.live.contains(&endpoint)
    }

    fn broadcast_address(&self) -> Endpoint {
        self.broadcast_address
    }
}

pub struct FakeSnitch;

impl Snitch for FakeSnitch {
    fn datacenter(&self, _endpoint: Endpoint) -> String {
        "dc1".to_string()
    }
}

pub struct FakeReplication(pub Vec<Endpoint>);

impl Replication for FakeReplication {
    fn natural_endpoints(&self, _schema: &SchemaRef, _token: crate::value::Token) -> Vec<Endpoint> {
        self.0.clone()
    }
}

pub struct FakeTokenMetadata(pub Vec<Endpoint>);

impl TokenMetadata for FakeTokenMetadata {
    fn pending_endpoints_for(&self, _token: crate::value::Token, _schema_full_name: &str) -> Vec<Endpoint> {
        self.0.clone()
    }
}

pub struct FakeStatementFactory;

impl StatementFactory for FakeStatementFactory {
    fn prepare(&self, sql: &str) -> Result<Box<dyn Statement>, Error> {
        Ok(Box::new(FakeStatement::new(sql)))
    }
}

/// Fixed-index tie-break: always returns `index % candidate_count`, making
/// tests deterministic without faking real randomness.
pub struct FakeTieBreak(pub usize);

impl TieBreak for FakeTieBreak {
    fn pick(&self, candidate_count: usize) -> usize {
        self.0 % candidate_count
    }
}

fn endpoint(port: u16) -> Endpoint {
    format!("127.0.0.1:{port}").parse::<SocketAddr>().unwrap().into()
}

#[allow(dead_code)]
pub fn test_endpoint(port: u16) -> Endpoint {
    endpoint(port)
}

/// A minimal `Statement` implementation for router tests. Not a SQL engine:
/// `update_local`/`query_local` return fixed, test-controlled shapes.
pub struct FakeStatement {
    sql: String,
    local: bool,
    parameters: Vec<Value>,
    rows: Vec<Row>,
    source_rows: Vec<Row>,
    fetch_size: i64,
    top_filter: TopFilter,
    order_by: Vec<OrderBy>,
    group: bool,
    limit_or_offset: bool,
    schema: SchemaRef,
}

impl FakeStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        FakeStatement {
            sql: sql.into(),
            local: false,
            parameters: Vec::new(),
            rows: Vec::new(),
            source_rows: Vec::new(),
            fetch_size: -1,
            top_filter: TopFilter::default(),
            order_by: Vec::new(),
            group: false,
            limit_or_offset: false,
            schema: SchemaRef::new("t"),
        }
    }

    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_top_filter(mut self, filter: TopFilter) -> Self {
        self.top_filter = filter;
        self
    }

    pub fn as_group_query(mut self) -> Self {
        self.group = true;
        self
    }
}

impl Statement for FakeStatement {
    fn is_local(&self) -> bool {
        self.local
    }

    fn set_local(&mut self, local: bool) {
        self.local = local;
    }

    fn sql(&self) -> &str {
        &self.sql
    }

    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn plan_sql(&self, _distributed: bool, _for_reducer: bool) -> String {
        self.sql.clone()
    }

    fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    fn set_parameters(&mut self, params: Vec<Value>) {
        self.parameters = params;
    }

    fn fetch_size(&self) -> i64 {
        self.fetch_size
    }

    fn set_fetch_size(&mut self, fetch_size: i64) {
        self.fetch_size = fetch_size;
    }

    fn rows(&self) -> Vec<Row> {
        self.rows.clone()
    }

    fn plan_sql_with_rows(&self, rows: &[Row]) -> String {
        format!("{} /* {} rows */", self.sql, rows.len())
    }

    fn top_filter(&self) -> &TopFilter {
        &self.top_filter
    }

    fn order_by(&self) -> &[OrderBy] {
        &self.order_by
    }

    fn is_group_query(&self) -> bool {
        self.group
    }

    fn has_limit_or_offset(&self) -> bool {
        self.limit_or_offset
    }

    fn set_source_rows(&mut self, rows: Vec<Row>) {
        self.source_rows = rows;
    }

    fn update_local(&self) -> Result<i64, Error> {
        if !self.source_rows.is_empty() {
            Ok(self.source_rows.len() as i64)
        } else {
            Ok(1)
        }
    }

    fn query_local(&self, _max_rows: i64) -> Result<Box<dyn RowResult>, Error> {
        Ok(Box::new(BufferedResult::new(
            vec![Row::new(None, vec![Value::Int(1)])],
            1,
            false,
        )))
    }
}

#[allow(unused)]
fn require_arc_send_sync(_m: Arc<dyn Membership>) {}
