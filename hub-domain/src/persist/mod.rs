//! 事件持久化（persist）
//!
//! Outbox 风格的事件存储：
//! - `EventRecord`：带状态与重试簿记的 outbox 行；
//! - `EventStore`：幂等创建、原子认领（claim）与状态推进的存储协议；
//! - `InMemoryEventStore`：互斥锁保护的内存实现；
//! - `PgEventStore`（`infra-sqlx` 特性）：基于 `FOR UPDATE SKIP LOCKED` 的 Postgres 实现。
//!
//! 记录从不被本层删除；保留与清理属于外部职责。
//!
mod event_record;
mod event_store;
mod inmemory;
#[cfg(feature = "infra-sqlx")]
mod postgres;

pub use event_record::{EventRecord, EventStatus, NewEventRecord};
pub use event_store::{CreateOutcome, EventStore};
pub use inmemory::InMemoryEventStore;
#[cfg(feature = "infra-sqlx")]
pub use postgres::PgEventStore;
