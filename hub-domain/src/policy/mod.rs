//! 重试策略（policy）
//!
//! - `RetryPolicy`：退避参数与最大尝试次数；
//! - `RetryPolicyRegistry`：模块名 → 重试策略，调度器每个 tick 读取；
//! - `InMemoryRetryPolicyRegistry`：具名策略 + 模块指派，未指派的模块回落到默认策略。
//!
mod registry;
mod retry_policy;

pub use registry::{InMemoryRetryPolicyRegistry, PolicyAssignment, RetryPolicyRegistry};
pub use retry_policy::RetryPolicy;
