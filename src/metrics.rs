//! Prometheus metrics exporter.
//!
//! Mirrors the teacher's registry-of-lazily-registered-gauges pattern: one
//! process-wide [`Registry`], one `Lazy` static per metric, a plain HTTP/1.1
//! server that re-renders the registry on every scrape (no push, no
//! aggregation window).

use std::io::Write;
use std::net::SocketAddr;

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};

pub(crate) static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static STATEMENTS_ROUTED: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "shardrouter_statements_routed_total",
            "Statements dispatched by the router, by verb ('ddl', 'insert', 'update', 'select') and path ('local', 'resolved', 'broadcast').",
        ),
        &["verb", "path"],
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static DDL_FORWARDS: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "shardrouter_ddl_forwards_total",
            "DDL statements forwarded to another node, by role ('seed_fanout', 'non_seed_forward', 're_entrant').",
        ),
        &["role"],
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static PEER_SESSIONS: Lazy<IntGaugeVec> = Lazy::new(|| {
    let gauge = IntGaugeVec::new(
        Opts::new(
            "shardrouter_peer_sessions",
            "Interned peer sessions currently held open by the pool, by peer endpoint.",
        ),
        &["peer"],
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

pub static CLUSTER_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "shardrouter_cluster_errors_total",
            "Cluster-level dispatch failures, by kind ('no_live_seed', 'no_live_destinations', 'peer_failed').",
        ),
        &["kind"],
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static STATEMENTS_CANCELLED: Lazy<prometheus::IntCounter> = Lazy::new(|| {
    let counter = prometheus::IntCounter::new(
        "shardrouter_statements_cancelled_total",
        "Client-requested statement cancellations recorded on a session.",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Forces registration of every metric above; call once at startup so the
/// first scrape doesn't race lazy registration under concurrent load.
pub fn register_all() {
    Lazy::force(&STATEMENTS_ROUTED);
    Lazy::force(&DDL_FORWARDS);
    Lazy::force(&PEER_SESSIONS);
    Lazy::force(&CLUSTER_ERRORS);
    Lazy::force(&STATEMENTS_CANCELLED);
}

/// Serves the text-format registry over plain HTTP on `addr` until the
/// listener errors. Intended to run as a background task spawned from
/// `main` (§6 "ambient stack", not part of the distributed-execution core).
pub async fn serve(addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "metrics endpoint listening");
    loop {
        let (stream, _) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(err) = handle_scrape(stream).await {
                tracing::warn!(%err, "metrics scrape request failed");
            }
        });
    }
}

async fn handle_scrape(stream: TcpStream) -> std::io::Result<()> {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(write_half);

    let mut buf = [0u8; 1024];
    let _ = reader.read(&mut buf).await?;

    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut body = Vec::new();
    encoder
        .encode(&families, &mut body)
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
        encoder.format_type(),
        body.len(),
    );
    writer.write_all(response.as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}
