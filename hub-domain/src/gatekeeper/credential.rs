use crate::error::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 生产者凭证：一个 API Key 对应唯一的授权来源与一组允许的事件类型前缀
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    api_key: String,
    source: String,
    allowed_prefixes: Vec<String>,
}

impl Credential {
    pub fn new(
        api_key: impl Into<String>,
        source: impl Into<String>,
        allowed_prefixes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            source: source.into(),
            allowed_prefixes: allowed_prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn allowed_prefixes(&self) -> &[String] {
        &self.allowed_prefixes
    }

    /// 事件类型是否落在该凭证允许的前缀内
    pub fn allows_type(&self, event_type: &str) -> bool {
        self.allowed_prefixes
            .iter()
            .any(|prefix| event_type.starts_with(prefix.as_str()))
    }
}

// API Key 属于密钥，调试输出中只保留前缀
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown: String = self.api_key.chars().take(8).collect();
        f.debug_struct("Credential")
            .field("api_key", &format_args!("{shown}***"))
            .field("source", &self.source)
            .field("allowed_prefixes", &self.allowed_prefixes)
            .finish()
    }
}

/// 凭证注册表：启动时显式构建并注入，运行期只读，无需加锁
#[derive(Debug, Clone, Default)]
pub struct CredentialRegistry {
    by_key: HashMap<String, Credential>,
}

impl CredentialRegistry {
    pub fn from_credentials(credentials: impl IntoIterator<Item = Credential>) -> DomainResult<Self> {
        let mut by_key = HashMap::new();

        for mut credential in credentials {
            credential.api_key = credential.api_key.trim().to_string();
            if credential.api_key.is_empty() {
                return Err(DomainError::InvalidConfig {
                    reason: format!("empty api key for source {}", credential.source),
                });
            }
            if credential.allowed_prefixes.is_empty() {
                return Err(DomainError::InvalidConfig {
                    reason: format!("no allowed prefixes for source {}", credential.source),
                });
            }
            let key = credential.api_key.clone();
            if by_key.insert(key, credential).is_some() {
                return Err(DomainError::InvalidConfig {
                    reason: "duplicate api key in credential set".to_string(),
                });
            }
        }

        Ok(Self { by_key })
    }

    pub fn lookup(&self, api_key: &str) -> Option<&Credential> {
        self.by_key.get(api_key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
