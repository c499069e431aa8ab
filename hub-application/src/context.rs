/// 应用层上下文（Application Context）
///
/// 承载一次应用层调用（命令/查询）所需的横切信息：
/// - `correlation_id`：链路追踪，写入日志字段；
/// - `actor_id`：调用方（生产者模块或运维人员）；
/// - `idempotency_key`：入口层的重复提交保护，发布时作为缺省的 `messageId`。
///
/// ```rust
/// use hub_application::context::AppContext;
///
/// let ctx = AppContext::default()
///     .with_correlation_id("cor-123")
///     .with_actor_id("ops-alice");
/// assert_eq!(ctx.correlation_id.as_deref(), Some("cor-123"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct AppContext {
    pub correlation_id: Option<String>,
    pub actor_id: Option<String>,
    pub idempotency_key: Option<String>,
}

impl AppContext {
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_actor_id(mut self, id: impl Into<String>) -> Self {
        self.actor_id = Some(id.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub(crate) fn correlation(&self) -> &str {
        self.correlation_id.as_deref().unwrap_or("-")
    }
}
