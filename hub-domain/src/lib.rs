//! 事件中枢领域层（hub-domain）
//!
//! 可靠事件投递子系统的核心：
//! - 生产者准入（`gatekeeper`）：API Key 鉴权、来源与类型前缀授权、信封校验与时间偏移窗口；
//! - 主题路由（`routing`）：路由键推导、广播/定向区分与下游拓扑匹配；
//! - 事件存储（`persist`）：outbox 表、幂等创建与基于租约的原子认领；
//! - 重试策略（`policy`）：按模块的退避参数与注册表；
//! - 可靠投递（`eventing`）：总线协议、发布器与重试调度器；
//! - 时钟（`clock`）与值对象（`value_object`）等通用构件。
//!
//! 本 crate 与具体传输实现解耦：总线只需实现 `MessageFabric`，存储只需实现 `EventStore`。
//! 启用 `infra-sqlx` 特性后提供 Postgres 存储实现。
//!
//! 典型用法：
//! 1. 构建 `CredentialRegistry` 与 `Gatekeeper`，对入站信封执行 `admit`；
//! 2. 选择 `EventStore` 与 `MessageFabric` 实现，装配 `Publisher` 并调用 `publish`；
//! 3. 以同一 `Publisher` 构建 `RetryScheduler` 并 `start`，在退出时 `shutdown` + `join`。
//!
pub mod clock;
pub mod error;
pub mod eventing;
pub mod gatekeeper;
pub mod persist;
pub mod policy;
pub mod routing;
pub mod value_object;
