use hub_domain::error::{AdmissionError, DomainError};

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("domain: {0}")]
    Domain(DomainError),

    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("handler not found: {0}")]
    HandlerNotFound(&'static str),

    #[error("handler already registered: command={command}")]
    AlreadyRegisteredCommand { command: &'static str },

    #[error("handler already registered: query={query}")]
    AlreadyRegisteredQuery { query: &'static str },

    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

// 领域层包裹的准入错误提升为 `Admission`，便于边界层统一映射
impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Admission(inner) => AppError::Admission(inner),
            other => AppError::Domain(other),
        }
    }
}

impl AppError {
    /// 边界层（HTTP 等）的状态码提示：鉴权 403、校验 400、不存在 404、状态冲突 409，其余 500
    pub fn status_hint(&self) -> u16 {
        match self {
            AppError::Admission(AdmissionError::Unauthorized { .. }) => 403,
            AppError::Admission(AdmissionError::Invalid { .. }) | AppError::Validation(_) => 400,
            AppError::NotFound(_) | AppError::Domain(DomainError::NotFound { .. }) => 404,
            AppError::Domain(DomainError::InvalidState { .. } | DomainError::Conflict { .. }) => 409,
            AppError::Domain(DomainError::InvalidPolicy { .. }) => 400,
            _ => 500,
        }
    }

    /// 是否为请求方的过错（不可重试）
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_hint())
    }
}
