use super::RetryPolicy;
use crate::error::{DomainError, DomainResult};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// 重试策略注册表：模块名 → 重试策略
#[async_trait]
pub trait RetryPolicyRegistry: Send + Sync {
    async fn policy_for(&self, module: &str) -> DomainResult<RetryPolicy>;
}

/// 模块与策略的指派关系
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyAssignment {
    pub module: String,
    pub policy: String,
}

/// 内存注册表：读多写少，使用 `DashMap` 免去全局锁
#[derive(Debug)]
pub struct InMemoryRetryPolicyRegistry {
    default_policy: RetryPolicy,
    policies: DashMap<String, RetryPolicy>,
    assignments: DashMap<String, String>,
}

impl Default for InMemoryRetryPolicyRegistry {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl InMemoryRetryPolicyRegistry {
    pub fn new(default_policy: RetryPolicy) -> Self {
        Self {
            default_policy,
            policies: DashMap::new(),
            assignments: DashMap::new(),
        }
    }

    /// 从策略集与指派表一次性构建
    pub fn from_parts(
        default_policy: RetryPolicy,
        policies: impl IntoIterator<Item = RetryPolicy>,
        assignments: impl IntoIterator<Item = PolicyAssignment>,
    ) -> DomainResult<Self> {
        default_policy.validate()?;
        let registry = Self::new(default_policy);
        for policy in policies {
            registry.upsert_policy(policy)?;
        }
        for PolicyAssignment { module, policy } in assignments {
            registry.assign(&module, &policy)?;
        }
        Ok(registry)
    }

    pub fn default_policy(&self) -> &RetryPolicy {
        &self.default_policy
    }

    pub fn upsert_policy(&self, policy: RetryPolicy) -> DomainResult<()> {
        policy.validate()?;
        tracing::info!(policy = %policy.name, max_tries = policy.max_tries, "retry policy upserted");
        self.policies.insert(policy.name.clone(), policy);
        Ok(())
    }

    /// 删除策略；仍被模块指派时拒绝
    pub fn remove_policy(&self, name: &str) -> DomainResult<RetryPolicy> {
        if let Some(entry) = self.assignments.iter().find(|a| a.value() == name) {
            return Err(DomainError::invalid_state(format!(
                "retry policy {name} is still assigned to module {}",
                entry.key()
            )));
        }
        self.policies
            .remove(name)
            .map(|(_, policy)| policy)
            .ok_or_else(|| DomainError::not_found(format!("retry policy {name}")))
    }

    pub fn get_policy(&self, name: &str) -> Option<RetryPolicy> {
        self.policies.get(name).map(|p| p.clone())
    }

    pub fn assign(&self, module: &str, policy: &str) -> DomainResult<()> {
        if !self.policies.contains_key(policy) {
            return Err(DomainError::not_found(format!("retry policy {policy}")));
        }
        self.assignments.insert(module.to_string(), policy.to_string());
        Ok(())
    }

    /// 取消指派，返回原策略名
    pub fn unassign(&self, module: &str) -> Option<String> {
        self.assignments.remove(module).map(|(_, policy)| policy)
    }

    pub fn assignments(&self) -> Vec<PolicyAssignment> {
        let mut all: Vec<PolicyAssignment> = self
            .assignments
            .iter()
            .map(|a| PolicyAssignment {
                module: a.key().clone(),
                policy: a.value().clone(),
            })
            .collect();
        all.sort_by(|a, b| a.module.cmp(&b.module));
        all
    }

    fn resolve(&self, module: &str) -> RetryPolicy {
        self.assignments
            .get(module)
            .and_then(|name| self.policies.get(name.value()).map(|p| p.clone()))
            .unwrap_or_else(|| self.default_policy.clone())
    }
}

#[async_trait]
impl RetryPolicyRegistry for InMemoryRetryPolicyRegistry {
    async fn policy_for(&self, module: &str) -> DomainResult<RetryPolicy> {
        Ok(self.resolve(module))
    }
}
