//! 重试调度器（RetryScheduler）
//!
//! 固定间隔的后台任务：每个 tick 从存储认领到期记录，以有限并发交给发布器重新投递，
//! 由发布器按模块策略推进为 DELIVERED / FAILED / DEAD_LETTER。
//! 多个调度实例可并发运行，`claim_due` 是唯一的同步点。
//!
use super::{DeliveryOutcome, Publisher};
use crate::clock::Clock;
use crate::error::DomainResult;
use bon::Builder;
use chrono::{DateTime, Utc};
use futures_util::{StreamExt, stream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// 调度器配置
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// tick 间隔
    pub interval: Duration,
    /// 每个 tick 最多认领的记录数
    pub batch_size: usize,
    /// 单个 tick 内的投递并发
    pub concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            batch_size: 100,
            concurrency: 8,
        }
    }
}

/// 单个 tick 的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub claimed: usize,
    pub delivered: usize,
    pub rescheduled: usize,
    pub dead_lettered: usize,
    /// 结算时出现存储错误的记录数（租约到期后会被再次认领）
    pub errors: usize,
}

#[derive(Builder)]
pub struct RetryScheduler {
    publisher: Arc<Publisher>,
    clock: Arc<dyn Clock>,
    #[builder(default)]
    config: SchedulerConfig,
}

impl RetryScheduler {
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// 执行一个 tick
    pub async fn run_once(&self, now: DateTime<Utc>) -> DomainResult<TickReport> {
        let batch = self
            .publisher
            .store()
            .claim_due(now, self.config.batch_size)
            .await?;
        if batch.is_empty() {
            return Ok(TickReport::default());
        }

        let claimed = batch.len();
        let delivered = AtomicUsize::new(0);
        let rescheduled = AtomicUsize::new(0);
        let dead_lettered = AtomicUsize::new(0);
        let errors = AtomicUsize::new(0);

        stream::iter(batch)
            .for_each_concurrent(Some(self.config.concurrency.max(1)), |record| {
                let publisher = self.publisher.clone();
                let (delivered, rescheduled, dead_lettered, errors) =
                    (&delivered, &rescheduled, &dead_lettered, &errors);
                async move {
                    let message_id = record.message_id().to_string();
                    match publisher.redeliver(record).await {
                        Ok(DeliveryOutcome::Delivered(_)) => delivered.fetch_add(1, Ordering::Relaxed),
                        Ok(DeliveryOutcome::Rescheduled(_)) => rescheduled.fetch_add(1, Ordering::Relaxed),
                        Ok(DeliveryOutcome::DeadLettered(_)) => {
                            dead_lettered.fetch_add(1, Ordering::Relaxed)
                        }
                        Err(err) => {
                            error!(message_id = %message_id, error = %err, "failed to settle redelivery");
                            errors.fetch_add(1, Ordering::Relaxed)
                        }
                    };
                }
            })
            .await;

        let report = TickReport {
            claimed,
            delivered: delivered.into_inner(),
            rescheduled: rescheduled.into_inner(),
            dead_lettered: dead_lettered.into_inner(),
            errors: errors.into_inner(),
        };
        info!(
            claimed = report.claimed,
            delivered = report.delivered,
            rescheduled = report.rescheduled,
            dead_lettered = report.dead_lettered,
            errors = report.errors,
            "retry sweep finished"
        );
        Ok(report)
    }

    /// 启动周期任务，返回可用于关闭/等待的句柄
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let token = CancellationToken::new();
        let interval = self.config.interval;
        let scheduler = self.clone();

        let task = Self::spawn_periodic(token.clone(), interval, move || {
            let scheduler = scheduler.clone();
            async move {
                let now = scheduler.clock.now();
                if let Err(err) = scheduler.run_once(now).await {
                    error!(error = %err, "retry sweep failed");
                }
            }
        });

        debug!(interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX), "retry scheduler started");
        SchedulerHandle {
            token,
            task: Some(task),
        }
    }

    fn spawn_periodic<F, Fut>(token: CancellationToken, interval: Duration, mut f: F) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => f().await,
                }
            }
        })
    }
}

/// 调度器运行句柄：用于优雅关闭与等待任务结束
pub struct SchedulerHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// 等待后台任务退出；需先调用 `shutdown`
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use crate::eventing::{InMemoryFabric, PublisherConfig};
    use crate::persist::{EventStatus, EventStore, InMemoryEventStore, NewEventRecord};
    use crate::policy::InMemoryRetryPolicyRegistry;
    use crate::routing::Topology;

    fn new_record(id: &str, at: DateTime<Utc>) -> NewEventRecord {
        NewEventRecord::builder()
            .message_id(id)
            .event_type("users.user.updated")
            .source("/users/api")
            .content_type("application/json")
            .payload("{}")
            .routing_key("users.updated")
            .broadcast(true)
            .module("users")
            .occurred_at(at)
            .received_at(at)
            .build()
    }

    fn wire(
        store: Arc<InMemoryEventStore>,
        fabric: Arc<InMemoryFabric>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> RetryScheduler {
        let publisher = Publisher::builder()
            .store(store)
            .fabric(fabric)
            .policies(Arc::new(InMemoryRetryPolicyRegistry::default()))
            .clock(clock.clone())
            .config(PublisherConfig {
                exchange: "x".into(),
                send_timeout: Duration::from_millis(200),
            })
            .build()
            .unwrap();
        RetryScheduler::builder()
            .publisher(Arc::new(publisher))
            .clock(clock)
            .config(config)
            .build()
    }

    #[tokio::test]
    async fn run_once_delivers_due_records_in_batches() {
        let clock = ManualClock::default();
        let store = Arc::new(InMemoryEventStore::with_lease(Duration::from_secs(1)));
        let fabric = Arc::new(InMemoryFabric::new(Topology::standard("x", ["users"]), 64));
        let scheduler = wire(
            store.clone(),
            fabric.clone(),
            Arc::new(clock.clone()),
            SchedulerConfig {
                batch_size: 2,
                ..SchedulerConfig::default()
            },
        );

        for i in 0..3 {
            store.create(new_record(&format!("m-{i}"), clock.now())).await.unwrap();
        }
        // 创建时的租约尚未过期
        assert_eq!(scheduler.run_once(clock.now()).await.unwrap().claimed, 0);

        clock.advance(Duration::from_secs(1));
        let first = scheduler.run_once(clock.now()).await.unwrap();
        assert_eq!(first.claimed, 2);
        assert_eq!(first.delivered, 2);

        let second = scheduler.run_once(clock.now()).await.unwrap();
        assert_eq!(second.delivered, 1);
        assert_eq!(scheduler.run_once(clock.now()).await.unwrap(), TickReport::default());
        assert_eq!(fabric.accepted(), 3);
    }

    #[tokio::test]
    async fn failures_are_rescheduled_not_lost() {
        let clock = ManualClock::default();
        let store = Arc::new(InMemoryEventStore::with_lease(Duration::from_secs(1)));
        let fabric = Arc::new(InMemoryFabric::new(Topology::standard("x", ["users"]), 64));
        let scheduler = wire(
            store.clone(),
            fabric.clone(),
            Arc::new(clock.clone()),
            SchedulerConfig::default(),
        );

        let record = store.create(new_record("m", clock.now())).await.unwrap().into_record();
        clock.advance(Duration::from_secs(1));
        fabric.set_available(false);

        let report = scheduler.run_once(clock.now()).await.unwrap();
        assert_eq!(report.rescheduled, 1);
        let stored = store.get(record.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), EventStatus::Failed);
        assert_eq!(stored.attempts(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn started_scheduler_drains_and_shuts_down() {
        let store = Arc::new(InMemoryEventStore::with_lease(Duration::from_millis(300)));
        let fabric = Arc::new(InMemoryFabric::new(Topology::standard("x", ["users"]), 64));
        let scheduler = Arc::new(wire(
            store.clone(),
            fabric.clone(),
            Arc::new(SystemClock),
            SchedulerConfig {
                interval: Duration::from_millis(50),
                ..SchedulerConfig::default()
            },
        ));

        // 创建方“崩溃”：记录停留在 PENDING，等待租约到期后由调度器接管
        let record = store.create(new_record("orphan", Utc::now())).await.unwrap().into_record();

        let handle = scheduler.start();
        let _ = tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                let status = store.get(record.id()).await.unwrap().map(|r| r.status());
                if status == Some(EventStatus::Delivered) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(1), async {
            while !handle.is_finished() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("scheduler task did not stop after shutdown");
        handle.join().await;

        let stored = store.get(record.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), EventStatus::Delivered);
        assert_eq!(fabric.accepted(), 1);
    }
}
