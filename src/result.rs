//! Result composers (Component G).
//!
//! Three concrete implementations of one `RowResult` iterator interface
//! (Design Note "Result composition"): [`SerializedResult`] (lazy union,
//! mandatory streaming across peers), [`SortedResult`] (eager N-way merge)
//! and [`MergedResult`] (eager reducer feed). `RowResult::next` is async
//! because advancing a `SerializedResult` past one peer means issuing the
//! network round trip for the next one.

use std::cmp::Ordering as CmpOrdering;
use std::collections::VecDeque;

use async_trait::async_trait;

use crate::errors::Error;
use crate::value::Row;

/// Ascending/descending sort key over a column position, as carried by a
/// statement's `ORDER BY` (§4.7).
#[derive(Debug, Clone, Copy)]
pub struct OrderBy {
    pub column_index: usize,
    pub descending: bool,
}

/// The common result-iterator interface every composer and every
/// single-peer query result implements.
#[async_trait]
pub trait RowResult: Send {
    async fn next(&mut self) -> Result<Option<Row>, Error>;
    fn column_count(&self) -> usize;
    /// True when this result came from a row-count-undetermined response
    /// (§8: `rowCount < 0` selects the streaming path).
    fn is_streamed(&self) -> bool {
        false
    }
    async fn close(&mut self) {}
}

/// A fully materialized, in-memory result. Used for local execution results,
/// peer query results (after the eager per-peer read in
/// [`crate::client_command::ClientCommand::execute_query`]), and test fakes.
pub struct BufferedResult {
    rows: VecDeque<Row>,
    column_count: usize,
    streamed: bool,
}

impl BufferedResult {
    pub fn new(rows: Vec<Row>, column_count: usize, streamed: bool) -> Self {
        BufferedResult {
            rows: rows.into(),
            column_count,
            streamed,
        }
    }

    pub fn empty(column_count: usize) -> Self {
        BufferedResult::new(Vec::new(), column_count, false)
    }
}

#[async_trait]
impl RowResult for BufferedResult {
    async fn next(&mut self) -> Result<Option<Row>, Error> {
        Ok(self.rows.pop_front())
    }

    fn column_count(&self) -> usize {
        self.column_count
    }

    fn is_streamed(&self) -> bool {
        self.streamed
    }
}

/// A source of rows that may require a network round trip the first time it
/// is polled: either a local statement already evaluated, or a remote peer's
/// `ClientCommand` about to be executed. `SerializedResult` holds a list of
/// these and only pays for source `i+1` once source `i` is exhausted.
#[async_trait]
pub trait QuerySource: Send {
    async fn open(&mut self) -> Result<Box<dyn RowResult>, Error>;
}

/// Wraps an already-open `RowResult` so a completed local execution can sit
/// in a `SerializedResult`'s source list next to not-yet-executed remotes.
pub struct ReadySource(pub Option<Box<dyn RowResult>>);

#[async_trait]
impl QuerySource for ReadySource {
    async fn open(&mut self) -> Result<Box<dyn RowResult>, Error> {
        self.0
            .take()
            .ok_or_else(|| Error::Internal("ReadySource opened twice".into()))
    }
}

/// Lazy union of N per-peer row streams, draining commands in list order.
/// Used only when the select has no `GROUP BY` and no `ORDER BY` (§4.7).
/// Respects `limit` across the union. Streaming is mandatory here: source
/// `i+1` is never opened until source `i` is fully drained.
pub struct SerializedResult {
    sources: VecDeque<Box<dyn QuerySource>>,
    current: Option<Box<dyn RowResult>>,
    column_count: usize,
    limit: Option<u64>,
    emitted: u64,
}

impl SerializedResult {
    pub fn new(sources: Vec<Box<dyn QuerySource>>, column_count: usize, limit: Option<u64>) -> Self {
        SerializedResult {
            sources: sources.into(),
            current: None,
            column_count,
            limit,
            emitted: 0,
        }
    }
}

#[async_trait]
impl RowResult for SerializedResult {
    async fn next(&mut self) -> Result<Option<Row>, Error> {
        if let Some(limit) = self.limit {
            if self.emitted >= limit {
                return Ok(None);
            }
        }
        loop {
            if let Some(result) = self.current.as_mut() {
                if let Some(row) = result.next().await? {
                    self.emitted += 1;
                    return Ok(Some(row));
                }
                self.current = None;
            }
            match self.sources.pop_front() {
                Some(mut source) => {
                    self.current = Some(source.open().await?);
                }
                None => return Ok(None),
            }
        }
    }

    fn column_count(&self) -> usize {
        self.column_count
    }

    fn is_streamed(&self) -> bool {
        true
    }
}

/// N-way merge over per-peer results that already arrived sorted
/// consistently; imposes the select's `ORDER BY`. Eager gather is
/// acceptable here (Design Note "Result composition").
pub struct SortedResult {
    rows: VecDeque<Row>,
    column_count: usize,
}

impl SortedResult {
    pub async fn new(
        mut results: Vec<Box<dyn RowResult>>,
        order_by: &[OrderBy],
        max_rows: i64,
    ) -> Result<Self, Error> {
        let mut heads: Vec<Option<Row>> = Vec::with_capacity(results.len());
        for r in &mut results {
            heads.push(r.next().await?);
        }
        let column_count = results.first().map(|r| r.column_count()).unwrap_or(0);

        let mut merged = Vec::new();
        loop {
            let mut best: Option<usize> = None;
            for (i, head) in heads.iter().enumerate() {
                let Some(row) = head else { continue };
                best = match best {
                    None => Some(i),
                    Some(b) => {
                        if compare_rows(row, heads[b].as_ref().unwrap(), order_by) == CmpOrdering::Less {
                            Some(i)
                        } else {
                            Some(b)
                        }
                    }
                };
            }
            let Some(winner) = best else { break };
            merged.push(heads[winner].take().unwrap());
            heads[winner] = results[winner].next().await?;
            if max_rows >= 0 && merged.len() as i64 >= max_rows {
                break;
            }
        }

        Ok(SortedResult {
            rows: merged.into(),
            column_count,
        })
    }
}

fn compare_rows(a: &Row, b: &Row, order_by: &[OrderBy]) -> CmpOrdering {
    for key in order_by {
        let av = a.columns.get(key.column_index);
        let bv = b.columns.get(key.column_index);
        let ordering = compare_values(av, bv);
        let ordering = if key.descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != CmpOrdering::Equal {
            return ordering;
        }
    }
    CmpOrdering::Equal
}

fn compare_values(a: Option<&crate::value::Value>, b: Option<&crate::value::Value>) -> CmpOrdering {
    use crate::value::Value;
    match (a, b) {
        (None, None) => CmpOrdering::Equal,
        (None, Some(_)) => CmpOrdering::Less,
        (Some(_), None) => CmpOrdering::Greater,
        (Some(Value::Int(x)), Some(Value::Int(y))) => x.cmp(y),
        (Some(Value::Double(x)), Some(Value::Double(y))) => {
            x.partial_cmp(y).unwrap_or(CmpOrdering::Equal)
        }
        (Some(Value::Str(x)), Some(Value::Str(y))) => x.cmp(y),
        (Some(x), Some(y)) => format!("{x}").cmp(&format!("{y}")),
    }
}

#[async_trait]
impl RowResult for SortedResult {
    async fn next(&mut self) -> Result<Option<Row>, Error> {
        Ok(self.rows.pop_front())
    }

    fn column_count(&self) -> usize {
        self.column_count
    }
}

/// Feeds every per-peer row into a locally-prepared reducer statement
/// (`plan_sql(true, true)`) that finishes aggregations
/// (e.g. `SUM(SUM_i)`, `COUNT` becomes `SUM(COUNT_i)`) and re-applies
/// `ORDER BY`/`LIMIT`/`OFFSET`. The reducer statement is responsible for
/// treating the fed rows as its input (external execution engine contract,
/// see `Statement::set_source_rows`).
pub struct MergedResult {
    inner: Box<dyn RowResult>,
}

impl MergedResult {
    pub async fn new(
        results: Vec<Box<dyn RowResult>>,
        reducer: &mut dyn crate::session::Statement,
    ) -> Result<Self, Error> {
        let mut all_rows = Vec::new();
        for mut result in results {
            while let Some(row) = result.next().await? {
                all_rows.push(row);
            }
        }
        reducer.set_source_rows(all_rows);
        let inner = reducer.query_local(-1)?;
        Ok(MergedResult { inner })
    }
}

#[async_trait]
impl RowResult for MergedResult {
    async fn next(&mut self) -> Result<Option<Row>, Error> {
        self.inner.next().await
    }

    fn column_count(&self) -> usize {
        self.inner.column_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn row(v: i64) -> Row {
        Row::new(None, vec![Value::Int(v)])
    }

    #[tokio::test]
    async fn serialized_result_drains_sources_in_order_without_opening_next_early() {
        let s1 = ReadySource(Some(Box::new(BufferedResult::new(
            vec![row(1), row(2)],
            1,
            false,
        ))));
        let s2 = ReadySource(Some(Box::new(BufferedResult::new(vec![row(3)], 1, false))));
        let mut result = SerializedResult::new(
            vec![Box::new(s1), Box::new(s2)],
            1,
            None,
        );

        let mut seen = Vec::new();
        while let Some(r) = result.next().await.unwrap() {
            seen.push(r);
        }
        assert_eq!(seen, vec![row(1), row(2), row(3)]);
    }

    #[tokio::test]
    async fn serialized_result_respects_limit_across_the_union() {
        let s1 = ReadySource(Some(Box::new(BufferedResult::new(
            vec![row(1), row(2)],
            1,
            false,
        ))));
        let s2 = ReadySource(Some(Box::new(BufferedResult::new(vec![row(3)], 1, false))));
        let mut result = SerializedResult::new(vec![Box::new(s1), Box::new(s2)], 1, Some(2));

        let mut seen = Vec::new();
        while let Some(r) = result.next().await.unwrap() {
            seen.push(r);
        }
        assert_eq!(seen, vec![row(1), row(2)]);
    }

    #[tokio::test]
    async fn sorted_result_merges_presorted_peers() {
        let a: Box<dyn RowResult> = Box::new(BufferedResult::new(vec![row(1), row(4)], 1, false));
        let b: Box<dyn RowResult> = Box::new(BufferedResult::new(vec![row(2), row(3)], 1, false));
        let order = [OrderBy {
            column_index: 0,
            descending: false,
        }];
        let mut merged = SortedResult::new(vec![a, b], &order, -1).await.unwrap();

        let mut seen = Vec::new();
        while let Some(r) = merged.next().await.unwrap() {
            seen.push(r);
        }
        assert_eq!(seen, vec![row(1), row(2), row(3), row(4)]);
    }
}
