//! 领域层统一错误定义
//!
//! 按职责拆分为三类：
//! - `AdmissionError`：入口准入（鉴权/校验）失败，同步返回给调用方，绝不落库；
//! - `DeliveryError`：消息总线投递失败，区分可重试（Transient）与不可重试（Permanent）；
//! - `DomainError`：存储、状态机与配置等基础设施错误。
//!
use thiserror::Error;

/// 准入错误：鉴权失败（AuthError）或信封校验失败（ValidationError）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String },
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl AdmissionError {
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// 用于日志/遥测区分拒绝类别
    pub fn class(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "auth",
            Self::Invalid { .. } => "validation",
        }
    }
}

/// 投递错误：由消息总线（fabric）产生
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// 总线不可达、超时、连接被拒等，可按退避策略重试
    #[error("transient delivery failure: {0}")]
    Transient(String),
    /// 消息被总线拒收或格式非法，重试无意义
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// 统一错误类型（基础设施/状态机）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("parse error: {reason}")]
    Parse { reason: String },

    // --- 准入 ---
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    // --- 存储 ---
    #[error("event store error: {reason}")]
    EventStore { reason: String },
    #[error("database error: {reason}")]
    Database { reason: String },
    #[error("not found: {reason}")]
    NotFound { reason: String },

    // --- 消息总线 ---
    #[error("fabric error: {reason}")]
    Fabric { reason: String },

    // --- 状态机/配置 ---
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },
    #[error("conflict: {reason}")]
    Conflict { reason: String },
    #[error("invalid retry policy: {reason}")]
    InvalidPolicy { reason: String },
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl DomainError {
    pub fn event_store(reason: impl Into<String>) -> Self {
        Self::EventStore {
            reason: reason.into(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFound {
            reason: reason.into(),
        }
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// 同一 `message_id` 已属于另一个生产者来源
    pub fn message_id_taken(message_id: &str) -> Self {
        Self::Conflict {
            reason: format!("message id '{message_id}' is already used by another source"),
        }
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

// ---- Cross-crate conversions for infrastructure convenience ----

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DomainError::NotFound {
                reason: "row not found".to_string(),
            },
            other => DomainError::Database {
                reason: other.to_string(),
            },
        }
    }
}

impl From<uuid::Error> for DomainError {
    fn from(err: uuid::Error) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
        }
    }
}

impl From<chrono::ParseError> for DomainError {
    fn from(err: chrono::ParseError) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
        }
    }
}
