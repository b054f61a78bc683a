//! Session state, the `Statement` capability trait, and session properties
//! (Design Note "Polymorphism over statements").
//!
//! `Session` holds the per-session monotonically increasing `next_id`
//! counter and the `last_reconnect` epoch a `ClientCommand` compares itself
//! against (§3, §4.2). A session optionally owns a distributed
//! [`Transaction`] that accumulates peer-assigned local transaction names.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::result::RowResult;
use crate::value::Value;

/// A distributed transaction's client-visible state. `local_transaction_names`
/// grows whenever a peer reports one back to the client (§3).
#[derive(Debug, Default)]
pub struct Transaction {
    pub is_auto_commit: bool,
    local_transaction_names: Mutex<Vec<String>>,
}

impl Transaction {
    pub fn new(is_auto_commit: bool) -> Self {
        Transaction {
            is_auto_commit,
            local_transaction_names: Mutex::new(Vec::new()),
        }
    }

    pub fn record_local_transaction_name(&self, name: String) {
        self.local_transaction_names.lock().push(name);
    }

    pub fn local_transaction_names(&self) -> Vec<String> {
        self.local_transaction_names.lock().clone()
    }
}

/// Explicit replacement for the source's `TOKEN` sentinel property: when a
/// seed forwards DDL back onto this node, the forwarded call is marked as
/// already serialized so the router skips taking its own lock and instead
/// relies on the seed's outer serialization (§4.8, §9 Design Note
/// "Re-entrant DDL locking"). No name-based sentinel, no shared mutable
/// property bag.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionProperties {
    pub ddl_already_serialized: bool,
}

/// A handle to a local transactional context.
pub struct Session {
    next_id: AtomicI64,
    /// Incremented on each transport re-establishment; compared against a
    /// `ClientCommand`'s `created_epoch` to detect the need to re-prepare.
    last_reconnect: AtomicU64,
    transaction: Mutex<Option<Arc<Transaction>>>,
    properties: Mutex<SessionProperties>,
    closed: std::sync::atomic::AtomicBool,
    /// Command ids marked for out-of-band cancellation (§5: `cancel()` acts
    /// without taking the session lock). The transport layer consults this
    /// set independently of the in-flight `Transfer` use.
    cancelled: Mutex<HashSet<i64>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Session {
            next_id: AtomicI64::new(1),
            last_reconnect: AtomicU64::new(0),
            transaction: Mutex::new(None),
            properties: Mutex::new(SessionProperties::default()),
            closed: std::sync::atomic::AtomicBool::new(false),
            cancelled: Mutex::new(HashSet::new()),
        }
    }

    /// Server-side handle for the next prepared statement.
    pub fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// The highest id handed out so far; used by `prepare_if_required`'s
    /// LRU-distance check (§4.2).
    pub fn current_id(&self) -> i64 {
        self.next_id.load(Ordering::SeqCst) - 1
    }

    pub fn last_reconnect(&self) -> u64 {
        self.last_reconnect.load(Ordering::SeqCst)
    }

    /// Called by the transport layer whenever it re-establishes the
    /// connection; advancing the epoch forces every live `ClientCommand` to
    /// re-prepare on its next operation.
    pub fn mark_reconnected(&self) {
        self.last_reconnect.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn begin_transaction(&self, is_auto_commit: bool) -> Arc<Transaction> {
        let tx = Arc::new(Transaction::new(is_auto_commit));
        *self.transaction.lock() = Some(tx.clone());
        tx
    }

    pub fn transaction(&self) -> Option<Arc<Transaction>> {
        self.transaction.lock().clone()
    }

    pub fn properties(&self) -> SessionProperties {
        *self.properties.lock()
    }

    pub fn set_properties(&self, properties: SessionProperties) {
        *self.properties.lock() = properties;
    }

    /// Hook for session-variable sync with the peer after an execute; the
    /// concrete variable set is owned by the (external) execution engine, so
    /// this crate only provides the call site the source makes it from.
    pub fn read_session_state(&self) {}

    /// Marks `id` for out-of-band cancellation. Deliberately does not touch
    /// the `Transfer` lock so it can run concurrently with an in-flight
    /// execute (§5).
    pub fn cancel_statement(&self, id: i64) {
        self.cancelled.lock().insert(id);
        crate::metrics::STATEMENTS_CANCELLED.inc();
    }

    pub fn is_cancelled(&self, id: i64) -> bool {
        self.cancelled.lock().contains(&id)
    }

    /// Forgets a cancellation mark once it's been observed and acted on, so
    /// the set doesn't grow unbounded across a long-lived session.
    pub fn clear_cancelled(&self, id: i64) {
        self.cancelled.lock().remove(&id);
    }
}

/// A filter extracted from a statement's `WHERE`/`ON` clause, reduced to
/// what the partition resolver needs: an optional single-value equality on
/// the partition key column.
#[derive(Debug, Clone, Default)]
pub struct TopFilter {
    pub equality_literal: Option<Value>,
}

/// Common capability set every statement variant exposes to the router
/// (§3, §9 Design Note "Polymorphism over statements"). No inheritance
/// depth: one flat trait, one tagged enum of variants below.
pub trait Statement: Send + Sync {
    fn is_local(&self) -> bool;
    fn set_local(&mut self, local: bool);
    fn sql(&self) -> &str;
    /// The table this statement targets, used as the partition resolver's
    /// key into token metadata (§3 "Schema reference", §4.5).
    fn schema(&self) -> crate::value::SchemaRef;
    /// Rewritten SQL suitable for distributed or reducer execution.
    /// `for_replication`/`for_reducer` selects the pre-aggregation vs.
    /// final-aggregation rewrite for SELECTs; ignored by other verbs.
    fn plan_sql(&self, distributed: bool, for_reducer: bool) -> String;
    fn parameters(&self) -> &[Value];
    fn set_parameters(&mut self, params: Vec<Value>);
    fn fetch_size(&self) -> i64 {
        -1
    }
    /// True for an INSERT/MERGE driven by a sub-query rather than a literal
    /// row list (§4.8 INSERT/MERGE dispatch).
    fn is_subquery_driven(&self) -> bool {
        false
    }
    /// Rows to place for a row-routed INSERT/MERGE. Empty for every other
    /// verb and for sub-query-driven inserts.
    fn rows(&self) -> Vec<crate::value::Row> {
        Vec::new()
    }
    /// Plan SQL with `rows` inlined as literals, sent to one peer carrying
    /// only that peer's row subset (`iom.getPlanSQL(rows)`, §4.8 row-routing).
    fn plan_sql_with_rows(&self, _rows: &[crate::value::Row]) -> String {
        self.sql().to_string()
    }
    fn top_filter(&self) -> &TopFilter;
    fn order_by(&self) -> &[crate::result::OrderBy] {
        &[]
    }
    fn is_group_query(&self) -> bool {
        false
    }
    fn has_limit_or_offset(&self) -> bool {
        false
    }
    fn set_fetch_size(&mut self, _fetch_size: i64) {}
    /// Supplies rows gathered from peers as the input a locally-prepared
    /// reducer statement aggregates over (`MergedResult`). A no-op for every
    /// variant except a reducer select.
    fn set_source_rows(&mut self, _rows: Vec<crate::value::Row>) {}
    /// Runs this statement against the local execution engine. Update verbs
    /// return an affected-row count; the local execution engine (external
    /// collaborator) is responsible for dispatching on the concrete verb.
    fn update_local(&self) -> Result<i64, crate::errors::Error>;
    fn query_local(&self, max_rows: i64) -> Result<Box<dyn RowResult>, crate::errors::Error>;
}

/// Tagged statement variant dispatched on by the router (§4.8).
pub enum StatementKind {
    Define(Box<dyn Statement>),
    Insert(Box<dyn Statement>),
    Merge(Box<dyn Statement>),
    Update(Box<dyn Statement>),
    Delete(Box<dyn Statement>),
    Select(Box<dyn Statement>),
}

impl StatementKind {
    pub fn inner(&self) -> &dyn Statement {
        match self {
            StatementKind::Define(s)
            | StatementKind::Insert(s)
            | StatementKind::Merge(s)
            | StatementKind::Update(s)
            | StatementKind::Delete(s)
            | StatementKind::Select(s) => s.as_ref(),
        }
    }

    pub fn inner_mut(&mut self) -> &mut dyn Statement {
        match self {
            StatementKind::Define(s)
            | StatementKind::Insert(s)
            | StatementKind::Merge(s)
            | StatementKind::Update(s)
            | StatementKind::Delete(s)
            | StatementKind::Select(s) => s.as_mut(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_id_is_monotonically_increasing() {
        let session = Session::new();
        let a = session.next_id();
        let b = session.next_id();
        assert!(b > a);
        assert_eq!(session.current_id(), b);
    }

    #[test]
    fn mark_reconnected_advances_epoch() {
        let session = Session::new();
        let before = session.last_reconnect();
        session.mark_reconnected();
        assert!(session.last_reconnect() > before);
    }

    #[test]
    fn transaction_accumulates_local_transaction_names() {
        let session = Session::new();
        let tx = session.begin_transaction(false);
        tx.record_local_transaction_name("tx-1".into());
        tx.record_local_transaction_name("tx-2".into());
        assert_eq!(tx.local_transaction_names(), vec!["tx-1", "tx-2"]);
    }
}
