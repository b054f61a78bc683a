//! Client Command (Component C).
//!
//! Per-statement state machine over [`Transfer`]: prepare, execute, fetch
//! meta, close, cancel. State machine: `created → prepared ↔ executing →
//! closed`; re-prepare is the only transition that returns to `prepared`
//! with a new `id` (§4.2).

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex as AsyncMutex;

use crate::errors::{Error, ProtocolError};
use crate::parameter::{ClientCommandParameter, ParameterMetadata};
use crate::protocol::{
    COMMAND_CLOSE, COMMAND_EXECUTE_DISTRIBUTED_QUERY, COMMAND_EXECUTE_DISTRIBUTED_UPDATE,
    COMMAND_EXECUTE_QUERY, COMMAND_EXECUTE_UPDATE, COMMAND_GET_META_DATA, MIN_SENTINEL,
    SESSION_PREPARE, SESSION_PREPARE_READ_PARAMS, UNBOUNDED_FETCH,
};
use crate::result::{BufferedResult, RowResult};
use crate::session::Session;
use crate::transfer::Transfer;
use crate::value::{Row, Value};

/// A prepared statement bound to one peer connection.
pub struct ClientCommand<S> {
    transfer: Arc<AsyncMutex<Transfer<S>>>,
    sql: String,
    parameters: Vec<ClientCommandParameter>,
    id: i64,
    is_query: bool,
    /// `session.last_reconnect()` recorded at construction time; compared on
    /// every later operation to detect the need to re-prepare.
    created_epoch: u64,
    fetch_size: i64,
    session: Option<Arc<Session>>,
    server_cached_objects: i64,
}

impl<S> ClientCommand<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Constructs an inert command; callers must `prepare(true)` before use.
    /// `server_cached_objects` is the configured `ServerCachedObjects` limit
    /// (§6 System limits).
    pub fn new(
        transfer: Arc<AsyncMutex<Transfer<S>>>,
        sql: impl Into<String>,
        fetch_size: i64,
        session: Arc<Session>,
        server_cached_objects: i64,
    ) -> Self {
        ClientCommand {
            transfer,
            sql: sql.into(),
            parameters: Vec::new(),
            id: MIN_SENTINEL,
            is_query: false,
            created_epoch: session.last_reconnect(),
            fetch_size,
            session: Some(session),
            server_cached_objects,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn is_query(&self) -> bool {
        self.is_query
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_none()
    }

    fn session(&self) -> Result<Arc<Session>, Error> {
        self.session
            .clone()
            .ok_or(ProtocolError::CommandClosed { id: self.id }.into())
    }

    /// `setValue`-equivalent entry point used by callers binding parameters
    /// before an execute.
    pub fn bind(&mut self, index: usize, value: Value, close_old: bool) -> Result<(), Error> {
        let param = self
            .parameters
            .get_mut(index)
            .ok_or_else(|| Error::Internal(format!("no parameter at index {index}")))?;
        param.set_value(value, close_old)
    }

    pub fn parameters(&self) -> &[ClientCommandParameter] {
        &self.parameters
    }

    fn check_parameters(&self) -> Result<(), Error> {
        for p in &self.parameters {
            p.check_set()?;
        }
        Ok(())
    }

    /// Sends `SESSION_PREPARE`/`SESSION_PREPARE_READ_PARAMS` + id + sql,
    /// reads `isQuery`, skips the reserved boolean, reads `paramCount`, and,
    /// when `read_params` is set, rebuilds the parameter list from freshly
    /// read server metadata. First prepare always reads parameters;
    /// re-prepares triggered by `prepare_if_required` do not.
    pub async fn prepare(&mut self, read_params: bool) -> Result<(), Error> {
        let session = self.session()?;
        self.id = session.next_id();
        let mut transfer = self.transfer.lock().await;

        let tag = if read_params {
            SESSION_PREPARE_READ_PARAMS
        } else {
            SESSION_PREPARE
        };
        transfer.write_int(tag);
        transfer.write_long(self.id);
        transfer.write_string(&self.sql);
        transfer.done().await?;

        self.is_query = transfer.read_bool().await?;
        let _reserved = transfer.read_bool().await?;
        let param_count = transfer.read_int().await? as usize;

        if read_params {
            self.parameters.clear();
            for i in 0..param_count {
                let data_type = transfer.read_int().await?;
                let precision = transfer.read_long().await?;
                let scale = transfer.read_int().await?;
                let nullable = transfer.read_bool().await?;
                self.parameters.push(ClientCommandParameter::new(
                    i + 1,
                    ParameterMetadata {
                        data_type,
                        precision,
                        scale,
                        nullable,
                    },
                ));
            }
        }

        drop(transfer);
        self.created_epoch = session.last_reconnect();
        Ok(())
    }

    /// Pre-flight check performed by every execute/meta call (§4.2):
    /// forces a re-prepare when the session has reconnected since this
    /// command was created, fails if the session is closed, and re-prepares
    /// when `id` has aged out of the server's prepared-statement LRU.
    pub async fn prepare_if_required(&mut self) -> Result<(), Error> {
        let session = self.session()?;
        if session.last_reconnect() != self.created_epoch {
            self.id = MIN_SENTINEL;
        }
        if session.is_closed() {
            return Err(ProtocolError::CommandClosed { id: self.id }.into());
        }
        if self.id <= session.current_id() - self.server_cached_objects {
            self.prepare(false).await?;
        }
        Ok(())
    }

    /// Valid only if `is_query`. Allocates a new server object id and
    /// returns a row-count-determined result bound to it with unbounded
    /// fetch.
    pub async fn get_meta_data(&mut self) -> Result<Box<dyn RowResult>, Error> {
        if !self.is_query {
            return Err(ProtocolError::NotAQuery { id: self.id }.into());
        }
        self.prepare_if_required().await?;
        let session = self.session()?;
        let object_id = session.next_id();

        let mut transfer = self.transfer.lock().await;
        transfer.write_int(COMMAND_GET_META_DATA);
        transfer.write_long(self.id);
        transfer.write_long(object_id);
        transfer.done().await?;

        let column_count = transfer.read_int().await? as usize;
        let _row_count = transfer.read_int().await?;
        Ok(Box::new(BufferedResult::empty(column_count)))
    }

    /// Executes a query. Picks the distributed tag when the session owns a
    /// non-auto-commit transaction. `fetch` is `∞` for a scrollable cursor,
    /// else the configured `fetch_size`. `rowCount < 0` in the response
    /// selects the streaming result kind, `>= 0` the determined one (§8).
    pub async fn execute_query(
        &mut self,
        max_rows: i64,
        scrollable: bool,
    ) -> Result<Box<dyn RowResult>, Error> {
        self.check_parameters()?;
        self.prepare_if_required().await?;
        let session = self.session()?;
        if session.is_cancelled(self.id) {
            session.clear_cancelled(self.id);
            return Err(ProtocolError::Cancelled { id: self.id }.into());
        }
        let object_id = session.next_id();
        let distributed = session
            .transaction()
            .map(|tx| !tx.is_auto_commit)
            .unwrap_or(false);

        let params: Vec<Value> = self
            .parameters
            .iter()
            .map(|p| p.value().cloned().unwrap_or(Value::Null))
            .collect();

        let mut transfer = self.transfer.lock().await;
        let tag = if distributed {
            COMMAND_EXECUTE_DISTRIBUTED_QUERY
        } else {
            COMMAND_EXECUTE_QUERY
        };
        transfer.write_int(tag);
        transfer.write_long(self.id);
        transfer.write_long(object_id);
        transfer.write_long(max_rows);
        let fetch = if scrollable {
            UNBOUNDED_FETCH
        } else {
            self.fetch_size
        };
        transfer.write_long(fetch);
        transfer.write_params(&params);
        transfer.done().await?;

        if distributed {
            let tx_name = transfer.read_string().await?;
            if let Some(tx) = session.transaction() {
                tx.record_local_transaction_name(tx_name);
            }
        }

        let column_count = transfer.read_int().await? as usize;
        let row_count = transfer.read_int().await?;

        let result = if row_count >= 0 {
            let mut rows = Vec::with_capacity(row_count as usize);
            for _ in 0..row_count {
                rows.push(read_row(&mut transfer, column_count).await?);
            }
            BufferedResult::new(rows, column_count, false)
        } else {
            let mut rows = Vec::new();
            loop {
                if !transfer.read_bool().await? {
                    break;
                }
                rows.push(read_row(&mut transfer, column_count).await?);
                // Cooperative cancellation checkpoint: a scrollable/streaming
                // fetch can run long enough for a concurrent `cancel()` to
                // land mid-stream, so check after every row instead of only
                // at entry (§5: cancel must not require the transfer lock).
                if session.is_cancelled(self.id) {
                    session.clear_cancelled(self.id);
                    drop(transfer);
                    return Err(ProtocolError::Cancelled { id: self.id }.into());
                }
            }
            BufferedResult::new(rows, column_count, true)
        };

        drop(transfer);
        session.read_session_state();
        Ok(Box::new(result))
    }

    /// Executes an update/DDL/DML. Returns the server's update count.
    pub async fn execute_update(&mut self) -> Result<i64, Error> {
        self.check_parameters()?;
        self.prepare_if_required().await?;
        let session = self.session()?;
        if session.is_cancelled(self.id) {
            session.clear_cancelled(self.id);
            return Err(ProtocolError::Cancelled { id: self.id }.into());
        }
        let distributed = session
            .transaction()
            .map(|tx| !tx.is_auto_commit)
            .unwrap_or(false);

        let params: Vec<Value> = self
            .parameters
            .iter()
            .map(|p| p.value().cloned().unwrap_or(Value::Null))
            .collect();

        let mut transfer = self.transfer.lock().await;
        let tag = if distributed {
            COMMAND_EXECUTE_DISTRIBUTED_UPDATE
        } else {
            COMMAND_EXECUTE_UPDATE
        };
        transfer.write_int(tag);
        transfer.write_long(self.id);
        transfer.write_params(&params);
        transfer.done().await?;

        if distributed {
            let tx_name = transfer.read_string().await?;
            if let Some(tx) = session.transaction() {
                tx.record_local_transaction_name(tx_name);
            }
        }

        let update_count = transfer.read_int().await?;
        let _reserved = transfer.read_bool().await?;

        drop(transfer);
        session.read_session_state();
        Ok(update_count as i64)
    }

    /// No-op if the session is already gone. Best-effort `COMMAND_CLOSE`
    /// (transport errors logged and swallowed), then nulls the session and
    /// closes every bound parameter value. Idempotent: a second call sees
    /// `session` already `None`.
    pub async fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if !session.is_closed() {
            let mut transfer = self.transfer.lock().await;
            transfer.write_int(COMMAND_CLOSE);
            transfer.write_long(self.id);
            if let Err(err) = transfer.done().await {
                tracing::warn!(command_id = self.id, %err, "close: transport error swallowed");
            }
        }
        for param in &mut self.parameters {
            param.close();
        }
        self.parameters.clear();
    }

    /// Signals the server to abort this command by id. Deliberately does
    /// not acquire the transfer lock so it can interrupt an in-flight
    /// execute (§5); delegates to the out-of-band cancellation path on
    /// `Session`.
    pub fn cancel(&self) {
        if let Some(session) = &self.session {
            session.cancel_statement(self.id);
        }
    }
}

async fn read_row<S>(transfer: &mut Transfer<S>, column_count: usize) -> Result<Row, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut columns = Vec::with_capacity(column_count);
    for _ in 0..column_count {
        columns.push(transfer.read_value().await?);
    }
    Ok(Row::new(None, columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::net::SocketAddr;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn endpoint() -> crate::value::Endpoint {
        "127.0.0.1:1".parse::<SocketAddr>().unwrap().into()
    }

    fn command(
        server_cached_objects: i64,
    ) -> (ClientCommand<DuplexStream>, DuplexStream, Arc<Session>) {
        let (client, server) = duplex(8192);
        let transfer = Arc::new(AsyncMutex::new(Transfer::new(client, endpoint())));
        let session = Arc::new(Session::new());
        let cmd = ClientCommand::new(
            transfer,
            "select 1",
            100,
            session.clone(),
            server_cached_objects,
        );
        (cmd, server, session)
    }

    /// Minimal fake peer: replies to one `SESSION_PREPARE*` request with
    /// `isQuery=true, reserved=false, paramCount=0`.
    async fn fake_prepare_reply(server: &mut DuplexStream) {
        let mut buf = [0u8; 256];
        let _ = server.read(&mut buf).await.unwrap();
        let mut resp = bytes::BytesMut::new();
        resp.extend_from_slice(&[1u8]); // isQuery = true
        resp.extend_from_slice(&[0u8]); // reserved
        resp.extend_from_slice(&0i32.to_be_bytes()); // paramCount
        server.write_all(&resp).await.unwrap();
    }

    #[tokio::test]
    async fn prepare_sets_is_query_from_first_response_boolean() {
        let (mut cmd, mut server, _session) = command(1000);
        let handle = tokio::spawn(async move {
            fake_prepare_reply(&mut server).await;
        });
        cmd.prepare(true).await.unwrap();
        handle.await.unwrap();
        assert!(cmd.is_query());
    }

    #[tokio::test]
    async fn boundary_id_equal_to_current_minus_cache_forces_reprepare() {
        let (mut cmd, mut server, session) = command(5);
        let handle = tokio::spawn(async move {
            fake_prepare_reply(&mut server).await;
            fake_prepare_reply(&mut server).await;
        });
        cmd.prepare(true).await.unwrap();
        // Advance current_id so that id == current_id - server_cached_objects.
        for _ in 0..5 {
            session.next_id();
        }
        let id_before = cmd.id();
        cmd.prepare_if_required().await.unwrap();
        handle.await.unwrap();
        assert_ne!(cmd.id(), id_before, "id == current-SCO must re-prepare");
    }

    #[tokio::test]
    async fn boundary_id_one_above_threshold_does_not_reprepare() {
        let (mut cmd, mut server, session) = command(5);
        let handle = tokio::spawn(async move {
            fake_prepare_reply(&mut server).await;
        });
        cmd.prepare(true).await.unwrap();
        // current_id - (SCO - 1) == id, i.e. one step inside the window.
        for _ in 0..4 {
            session.next_id();
        }
        let id_before = cmd.id();
        cmd.prepare_if_required().await.unwrap();
        handle.await.unwrap();
        assert_eq!(cmd.id(), id_before, "id within cache window must not re-prepare");
    }

    #[tokio::test]
    async fn reconnect_forces_reprepare_without_rereading_parameter_metadata() {
        let (mut cmd, mut server, session) = command(1000);
        let handle = tokio::spawn(async move {
            fake_prepare_reply(&mut server).await;
            fake_prepare_reply(&mut server).await;
        });
        cmd.prepare(true).await.unwrap();
        assert!(cmd.parameters().is_empty());
        session.mark_reconnected();
        cmd.prepare_if_required().await.unwrap();
        handle.await.unwrap();
        // Re-prepare must not have touched the (empty, already-read) parameter list.
        assert!(cmd.parameters().is_empty());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut cmd, mut server, _session) = command(1000);
        let handle = tokio::spawn(async move {
            fake_prepare_reply(&mut server).await;
            // COMMAND_CLOSE has no response; just drain it.
            let mut buf = [0u8; 64];
            let _ = server.read(&mut buf).await;
        });
        cmd.prepare(true).await.unwrap();
        cmd.close().await;
        assert!(cmd.is_closed());
        cmd.close().await; // second call must be a no-op, not panic or resend.
        handle.abort();
    }

    #[test]
    fn bind_checks_parameter_existence() {
        let (mut cmd, _server, _session) = command(1000);
        let err = cmd.bind(0, Value::Int(1), true).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn execute_update_rejects_a_pre_cancelled_command() {
        let (mut cmd, mut server, session) = command(1000);
        let handle = tokio::spawn(async move {
            fake_prepare_reply(&mut server).await;
        });
        cmd.prepare(true).await.unwrap();
        handle.await.unwrap();
        session.cancel_statement(cmd.id());
        let err = cmd.execute_update().await.unwrap_err();
        match err {
            Error::Protocol(ProtocolError::Cancelled { id }) => assert_eq!(id, cmd.id()),
            other => panic!("unexpected error: {other:?}"),
        }
        // The mark is consumed, not sticky, so a later execute isn't blocked forever.
        assert!(!session.is_cancelled(cmd.id()));
    }

    #[tokio::test]
    async fn execute_query_rejects_a_pre_cancelled_command() {
        let (mut cmd, mut server, session) = command(1000);
        let handle = tokio::spawn(async move {
            fake_prepare_reply(&mut server).await;
        });
        cmd.prepare(true).await.unwrap();
        handle.await.unwrap();
        session.cancel_statement(cmd.id());
        let err = cmd.execute_query(-1, false).await.unwrap_err();
        match err {
            Error::Protocol(ProtocolError::Cancelled { id }) => assert_eq!(id, cmd.id()),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!session.is_cancelled(cmd.id()));
    }
}
