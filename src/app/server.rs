//! Process entry point: builds the tokio runtime, wires the router's
//! collaborators, starts the metrics endpoint, and blocks until shutdown.
//!
//! The SQL parser / local execution engine is an external collaborator
//! (§1) this crate does not implement, so there is no client-facing TCP
//! accept loop here — embedding that loop (reading the wire protocol tags
//! in §6, parsing SQL into a [`crate::session::StatementKind`], and calling
//! into [`crate::router::StatementRouter`]) is the job of the process that
//! owns the parser. This binary demonstrates and exercises the wiring.

use std::process;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use tokio::runtime::Builder;

use crate::app::args::Args;
use crate::config::Config;
use crate::membership::InMemoryMembership;
use crate::metrics;
use crate::partition::{NoPendingRanges, PartitionResolver, StaticMemberReplication, Xxh3Partitioner};
use crate::peer_pool::{PeerSessionPool, TcpPeerConnector};
use crate::router::{SeededTieBreak, StatementRouter};
use crate::topology::StaticSnitch;
use crate::value::Endpoint;

pub fn run(args: Args, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Builder::new_multi_thread()
        .worker_threads(config.general.worker_threads)
        .thread_name("shardrouter-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))?;
    let _ = args;
    Ok(())
}

async fn async_main(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    config.show();

    let broadcast_address = Endpoint::new(config.general.broadcast_address);
    let seeds: Vec<Endpoint> = config.general.seeds.iter().map(|a| Endpoint::new(*a)).collect();
    let mut members: Vec<Endpoint> = seeds.clone();
    if !members.contains(&broadcast_address) {
        members.push(broadcast_address);
    }

    let membership: Arc<dyn crate::membership::Membership> = Arc::new(InMemoryMembership::new(
        broadcast_address,
        seeds,
        members.iter().copied().collect(),
    ));

    let datacenters = config
        .general
        .datacenters
        .iter()
        .map(|(addr, dc)| (Endpoint::new(*addr), dc.clone()))
        .collect();
    let snitch: Arc<dyn crate::topology::Snitch> =
        Arc::new(StaticSnitch::new(datacenters, config.general.default_datacenter.clone()));

    let replication: Arc<dyn crate::partition::Replication> =
        Arc::new(StaticMemberReplication::new(members));
    let token_metadata: Arc<dyn crate::partition::TokenMetadata> = Arc::new(NoPendingRanges);
    let resolver = Arc::new(PartitionResolver::new(Xxh3Partitioner, replication, token_metadata));

    let connect_timeout = StdDuration::from(config.general.connect_timeout);
    let pool = Arc::new(PeerSessionPool::new(TcpPeerConnector::new(connect_timeout)));

    let tie_break = Arc::new(SeededTieBreak::new(config.general.tie_break_seed));

    // No SQL parser wired in: the router is constructed and ready for an
    // embedding process to supply a `StatementFactory` and start routing.
    let statement_factory: Arc<dyn crate::router::StatementFactory> = Arc::new(UnimplementedStatementFactory);

    let _router = StatementRouter::new(
        pool,
        membership,
        snitch,
        resolver,
        statement_factory,
        tie_break,
        config.general.server_cached_objects,
        config.general.fetch_size,
    );

    metrics::register_all();
    let mut metrics_handle = None;
    if let Some(addr) = config.general.metrics_address {
        metrics_handle = Some(tokio::spawn(async move {
            if let Err(err) = metrics::serve(addr).await {
                tracing::error!(%err, "metrics server exited");
            }
        }));
    }

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, exiting");
    if let Some(handle) = metrics_handle {
        handle.abort();
    }
    Ok(())
}

struct UnimplementedStatementFactory;

impl crate::router::StatementFactory for UnimplementedStatementFactory {
    fn prepare(&self, _sql: &str) -> Result<Box<dyn crate::session::Statement>, crate::errors::Error> {
        Err(crate::errors::Error::Internal(
            "no SQL parser wired into this process; supply a StatementFactory".to_string(),
        ))
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => {},
        _ = sigint.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[allow(dead_code)]
fn exit_with_config_error(err: impl std::fmt::Display) -> ! {
    eprintln!("configuration error: {err}");
    process::exit(exitcode::CONFIG);
}
