//! 进程配置：环境变量 + 可选的 JSON 文件
//!
//! | 变量 | 缺省 |
//! |------|------|
//! | `HUB_EXCHANGE` | `letterboxd_exchange` |
//! | `HUB_MODULES` | `usuarios,movies,ratings,social,discovery,analytics` |
//! | `HUB_SCHEDULER_INTERVAL_MS` | 5000 |
//! | `HUB_BATCH_SIZE` | 100 |
//! | `HUB_CONCURRENCY` | 8 |
//! | `HUB_SEND_TIMEOUT_MS` | 5000 |
//! | `HUB_CLAIM_LEASE_MS` | 30000 |
//! | `HUB_MAX_SKEW_SECS` | 600 |
//! | `HUB_CREDENTIALS_FILE` | 内置开发凭证 |
//! | `HUB_RETRY_POLICIES_FILE` | 仅缺省策略 |
//! | `DATABASE_URL` | 启用 `postgres` 特性时必填 |
//!
use anyhow::{Context, Result, bail};
use hub_domain::eventing::{PublisherConfig, SchedulerConfig};
use hub_domain::gatekeeper::{Credential, CredentialRegistry, GatekeeperConfig};
use hub_domain::policy::{InMemoryRetryPolicyRegistry, PolicyAssignment, RetryPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_MODULES: [&str; 6] = ["usuarios", "movies", "ratings", "social", "discovery", "analytics"];

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub modules: Vec<String>,
    pub publisher: PublisherConfig,
    pub scheduler: SchedulerConfig,
    pub gatekeeper: GatekeeperConfig,
    pub claim_lease: Duration,
    pub credentials_file: Option<PathBuf>,
    pub retry_policies_file: Option<PathBuf>,
    pub database_url: Option<String>,
}

/// 重试策略文件格式
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PoliciesFile {
    default_policy: Option<RetryPolicy>,
    policies: Vec<RetryPolicy>,
    assignments: Vec<PolicyAssignment>,
}

impl HubConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let modules = match var("HUB_MODULES") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_MODULES.iter().map(|m| m.to_string()).collect(),
        };

        let publisher = PublisherConfig {
            exchange: var("HUB_EXCHANGE").unwrap_or_else(|| PublisherConfig::default().exchange),
            send_timeout: Duration::from_millis(parse_or(&var, "HUB_SEND_TIMEOUT_MS", 5_000)?),
        };
        let scheduler = SchedulerConfig {
            interval: Duration::from_millis(parse_or(&var, "HUB_SCHEDULER_INTERVAL_MS", 5_000)?),
            batch_size: parse_or(&var, "HUB_BATCH_SIZE", 100)?,
            concurrency: parse_or(&var, "HUB_CONCURRENCY", 8)?,
        };
        let gatekeeper = GatekeeperConfig {
            max_skew: Duration::from_secs(parse_or(&var, "HUB_MAX_SKEW_SECS", 600)?),
        };
        let claim_lease = Duration::from_millis(parse_or(&var, "HUB_CLAIM_LEASE_MS", 30_000)?);

        if scheduler.interval.is_zero() {
            bail!("HUB_SCHEDULER_INTERVAL_MS must be positive");
        }
        if scheduler.batch_size == 0 {
            bail!("HUB_BATCH_SIZE must be positive");
        }

        Ok(Self {
            modules,
            publisher,
            scheduler,
            gatekeeper,
            claim_lease,
            credentials_file: var("HUB_CREDENTIALS_FILE").map(PathBuf::from),
            retry_policies_file: var("HUB_RETRY_POLICIES_FILE").map(PathBuf::from),
            database_url: var("DATABASE_URL"),
        })
    }

    /// 加载生产者凭证；未配置文件时使用内置开发凭证
    pub fn load_credentials(&self) -> Result<CredentialRegistry> {
        let credentials = match &self.credentials_file {
            Some(path) => read_json::<Vec<Credential>>(path)?,
            None => {
                tracing::warn!("HUB_CREDENTIALS_FILE not set, using built-in development credentials");
                dev_credentials()
            }
        };
        CredentialRegistry::from_credentials(credentials).context("invalid credentials")
    }

    /// 加载重试策略注册表
    pub fn load_policies(&self) -> Result<InMemoryRetryPolicyRegistry> {
        let file = match &self.retry_policies_file {
            Some(path) => read_json::<PoliciesFile>(path)?,
            None => PoliciesFile::default(),
        };
        InMemoryRetryPolicyRegistry::from_parts(
            file.default_policy.unwrap_or_default(),
            file.policies,
            file.assignments,
        )
        .context("invalid retry policies")
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{name}: cannot parse '{raw}'")),
        None => Ok(default),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("decoding {}", path.display()))
}

fn dev_credentials() -> Vec<Credential> {
    vec![
        Credential::new("sk_core_usuarios_u1Kp7W2fQ9aX6mDb3Tz8NrVy", "/usuarios/api", ["usuarios."]),
        Credential::new(
            "sk_core_movies_m4Gs9Qp1Lk8Jz2Hb7Xt5VwRa",
            "/movies/api",
            ["peliculas.", "movies."],
        ),
        Credential::new(
            "sk_core_ratings_r7Dz3Kq9Tf2Lm8Pw5Xa1NvGe",
            "/ratings/api",
            ["resenas.", "ratings."],
        ),
        Credential::new("sk_core_social_s2Qw8Vn5Jk1Mz7Lp4Rt9HbXe", "/social/api", ["social."]),
        Credential::new(
            "sk_core_discovery_d9Lt2Xw6Qp3Va8Jm5Kr1ZyTc",
            "/discovery/api",
            ["discovery."],
        ),
        Credential::new(
            "sk_core_analytics_a6Np1Zv8Kr3Qw7Tx2Lm9HdRe",
            "/analytics/api",
            ["analytics."],
        ),
    ]
}
