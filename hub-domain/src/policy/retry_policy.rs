use crate::error::{DomainError, DomainResult};
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 按模块的重试策略
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    #[builder(into)]
    pub name: String,
    #[serde(with = "millis")]
    pub min_delay: Duration,
    #[serde(with = "millis")]
    pub max_delay: Duration,
    /// 含首次投递在内的最大尝试次数
    pub max_tries: u32,
    pub backoff_multiplier: f64,
    #[builder(default = true)]
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            max_tries: 5,
            backoff_multiplier: 2.0,
            enabled: true,
        }
    }
}

impl RetryPolicy {
    pub const DEFAULT_NAME: &'static str = "default";

    pub fn validate(&self) -> DomainResult<()> {
        let reason = if self.name.trim().is_empty() {
            Some("name must not be blank".to_string())
        } else if self.max_tries < 1 {
            Some("maxTries must be at least 1".to_string())
        } else if !self.backoff_multiplier.is_finite() || self.backoff_multiplier <= 1.0 {
            Some(format!(
                "backoffMultiplier must be a finite number > 1.0, got {}",
                self.backoff_multiplier
            ))
        } else if self.min_delay > self.max_delay {
            Some(format!(
                "minDelay {:?} exceeds maxDelay {:?}",
                self.min_delay, self.max_delay
            ))
        } else {
            None
        };

        match reason {
            Some(reason) => Err(DomainError::InvalidPolicy {
                reason: format!("{}: {reason}", self.name),
            }),
            None => Ok(()),
        }
    }

    /// 第 n 次失败后的退避时长，n 为此次失败之前已记录的失败次数：
    /// `min(maxDelay, minDelay · multiplier^n)`
    pub fn delay_for(&self, failures_before: u32) -> Duration {
        let exponent = i32::try_from(failures_before).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.powi(exponent);
        let scaled = self.min_delay.as_secs_f64() * factor;

        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::try_from_secs_f64(scaled)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// 本次失败后是否已耗尽重试
    pub fn is_exhausted(&self, failures_before: u32) -> bool {
        !self.enabled || failures_before.saturating_add(1) >= self.max_tries
    }
}

// 配置文件中以毫秒表示时长
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_tries: u32) -> RetryPolicy {
        RetryPolicy::builder()
            .name("test")
            .min_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(10))
            .max_tries(max_tries)
            .backoff_multiplier(2.0)
            .build()
    }

    #[test]
    fn exponential_then_capped() {
        let p = policy(10);
        let delays: Vec<u64> = (0..6).map(|n| p.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
        assert_eq!(p.delay_for(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn exhaustion_counts_the_current_failure() {
        let p = policy(3);
        assert!(!p.is_exhausted(0));
        assert!(!p.is_exhausted(1));
        assert!(p.is_exhausted(2));

        let disabled = RetryPolicy {
            enabled: false,
            ..policy(3)
        };
        assert!(disabled.is_exhausted(0));
    }

    #[test]
    fn validation_rules() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(policy(0).validate().is_err());
        assert!(
            RetryPolicy {
                backoff_multiplier: 1.0,
                ..policy(3)
            }
            .validate()
            .is_err()
        );
        assert!(
            RetryPolicy {
                backoff_multiplier: f64::NAN,
                ..policy(3)
            }
            .validate()
            .is_err()
        );
        assert!(
            RetryPolicy {
                min_delay: Duration::from_secs(20),
                ..policy(3)
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn decodes_millisecond_durations() {
        let p: RetryPolicy = serde_json::from_value(serde_json::json!({
            "name": "fast",
            "minDelay": 250,
            "maxDelay": 5000,
            "maxTries": 3,
            "backoffMultiplier": 1.5
        }))
        .unwrap();
        assert_eq!(p.min_delay, Duration::from_millis(250));
        assert!(p.enabled);
        assert_eq!(p.delay_for(1), Duration::from_millis(375));
    }
}
