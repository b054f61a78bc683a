//! Parallel executor (Component F).
//!
//! Runs a batch of callables concurrently via [`tokio::task::JoinSet`],
//! waits for all of them, and on the first failure aborts the rest
//! best-effort before propagating that failure (§4.6, §5).

use std::future::Future;
use std::pin::Pin;

use tokio::task::JoinSet;

use crate::errors::{convert, Error};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send>>;

/// Runs every callable concurrently and sums the returned update counts.
/// Matches single-node semantics for multi-replica writes: the router is
/// responsible for not double-counting at the application layer (§4.6).
pub async fn execute_update_callable(callables: Vec<BoxFuture<i64>>) -> Result<i64, Error> {
    let mut set = JoinSet::new();
    for fut in callables {
        set.spawn(fut);
    }

    let mut sum: i64 = 0;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(n)) => sum += n,
            Ok(Err(e)) => return fail_fast(set, e).await,
            Err(join_err) => return fail_fast(set, convert(join_err)).await,
        }
    }
    Ok(sum)
}

/// Runs every callable concurrently, returning the per-callable results in
/// submission order. Same failure policy as [`execute_update_callable`].
pub async fn execute_select_callable<T>(callables: Vec<BoxFuture<T>>) -> Result<Vec<T>, Error>
where
    T: Send + 'static,
{
    let n = callables.len();
    let mut set = JoinSet::new();
    for (index, fut) in callables.into_iter().enumerate() {
        set.spawn(async move { (index, fut.await) });
    }

    let mut results: Vec<Option<T>> = (0..n).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, Ok(value))) => results[index] = Some(value),
            Ok((_, Err(e))) => return fail_fast(set, e).await,
            Err(join_err) => return fail_fast(set, convert(join_err)).await,
        }
    }
    Ok(results
        .into_iter()
        .map(|r| r.expect("every index filled before join_next returns None"))
        .collect())
}

async fn fail_fast<T, R>(mut set: JoinSet<T>, err: Error) -> Result<R, Error>
where
    T: 'static,
{
    set.abort_all();
    while set.join_next().await.is_some() {}
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(n: i64) -> BoxFuture<i64> {
        Box::pin(async move { Ok(n) })
    }

    fn err(msg: &'static str) -> BoxFuture<i64> {
        Box::pin(async move { Err(Error::Internal(msg.into())) })
    }

    #[tokio::test]
    async fn update_callable_sums_all_results() {
        let sum = execute_update_callable(vec![ok(1), ok(2), ok(3)]).await.unwrap();
        assert_eq!(sum, 6);
    }

    #[tokio::test]
    async fn update_callable_propagates_first_failure() {
        let result = execute_update_callable(vec![ok(1), err("boom"), ok(3)]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn select_callable_preserves_submission_order() {
        let futs: Vec<BoxFuture<i64>> = vec![
            Box::pin(async { Ok(10) }),
            Box::pin(async { Ok(20) }),
            Box::pin(async { Ok(30) }),
        ];
        let results = execute_select_callable(futs).await.unwrap();
        assert_eq!(results, vec![10, 20, 30]);
    }
}
