//! 事件中枢进程
//!
//! 启动顺序：日志 → 配置 → 凭证与重试策略 → 事件存储 → 消息总线 → 发布器/调度器 → stdin 入口。
//! 输入结束或收到 Ctrl-C 时停止调度器并等待其退出。
//!
mod config;
mod ingest;

use anyhow::Result;
use config::HubConfig;
use futures_util::StreamExt;
use hub_application::EventHub;
use hub_domain::clock::{Clock, SystemClock};
use hub_domain::eventing::{InMemoryFabric, Publisher, RetryScheduler};
use hub_domain::gatekeeper::Gatekeeper;
use hub_domain::persist::EventStore;
use hub_domain::routing::Topology;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = HubConfig::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let credentials = Arc::new(config.load_credentials()?);
    let policies = Arc::new(config.load_policies()?);
    let store = open_store(&config).await?;

    let topology = Topology::standard(
        &config.publisher.exchange,
        config.modules.iter().map(String::as_str),
    );
    info!(
        exchange = topology.exchange(),
        queues = topology.queues().len(),
        "topology declared"
    );
    let fabric = Arc::new(InMemoryFabric::new(topology, 1024));

    let mut deliveries = fabric.subscribe();
    let tap = tokio::spawn(async move {
        while let Some(item) = deliveries.next().await {
            match item {
                Ok(routed) => debug!(
                    queue = %routed.queue,
                    routing_key = %routed.message.routing_key,
                    message_id = %routed.message.headers.message_id,
                    "message routed"
                ),
                Err(err) => warn!(error = %err, "delivery tap lagged"),
            }
        }
    });

    let publisher = Arc::new(
        Publisher::builder()
            .store(store)
            .fabric(fabric)
            .policies(policies)
            .clock(clock.clone())
            .config(config.publisher.clone())
            .build()?,
    );
    let gatekeeper = Arc::new(Gatekeeper::new(credentials, clock.clone()).with_config(config.gatekeeper));
    let hub = EventHub::new(gatekeeper, publisher.clone(), clock.clone())?;

    let scheduler = Arc::new(
        RetryScheduler::builder()
            .publisher(publisher)
            .clock(clock)
            .config(config.scheduler)
            .build(),
    );
    let handle = scheduler.start();
    info!("event hub ready, reading JSON lines from stdin");

    tokio::select! {
        res = ingest::run(&hub, BufReader::new(tokio::io::stdin()), tokio::io::stdout()) => {
            let handled = res?;
            info!(lines = handled, "stdin closed");
        }
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
    }

    handle.shutdown();
    handle.join().await;
    tap.abort();
    info!("event hub stopped");
    Ok(())
}

#[cfg(not(feature = "postgres"))]
async fn open_store(config: &HubConfig) -> Result<Arc<dyn EventStore>> {
    use hub_domain::persist::InMemoryEventStore;

    if config.database_url.is_some() {
        warn!("DATABASE_URL ignored: built without the `postgres` feature");
    }
    Ok(Arc::new(InMemoryEventStore::with_lease(config.claim_lease)))
}

#[cfg(feature = "postgres")]
async fn open_store(config: &HubConfig) -> Result<Arc<dyn EventStore>> {
    use anyhow::Context;
    use hub_domain::persist::PgEventStore;
    use sqlx::postgres::PgPoolOptions;

    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL is required with the `postgres` feature")?;
    let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
    let store = PgEventStore::new(pool).with_lease(config.claim_lease);
    store.migrate().await?;
    info!("postgres event store ready");
    Ok(Arc::new(store))
}
