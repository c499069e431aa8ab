//! 值对象（Value Object）
//!
//! 无标识、以值相等为准的对象，用于封装入站事件信封中的概念性值与校验逻辑：
//! 事件类型、来源路径、内容类型与消息 ID。
//!

use crate::error::AdmissionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 值对象抽象
pub trait ValueObject {
    /// 业务校验失败时的错误类型
    type Error;

    /// 创建值对象时进行验证
    fn validate(&self) -> Result<(), Self::Error>;
}

/// 事件动作（类型的最后一段）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Created,
    Updated,
    Deleted,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl FromStr for EventAction {
    type Err = AdmissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "deleted" => Ok(Self::Deleted),
            other => Err(AdmissionError::invalid(
                "type",
                format!("action must be created|updated|deleted, got '{other}'"),
            )),
        }
    }
}

/// 事件类型：`<domain>.<entity>.<action>`
///
/// `domain` 与 `entity` 仅允许小写 ASCII 字母。
///
/// # 示例
///
/// ```
/// use hub_domain::value_object::{EventAction, EventType};
///
/// let t = EventType::parse("movies.movie.created").unwrap();
/// assert_eq!(t.domain(), "movies");
/// assert_eq!(t.entity(), "movie");
/// assert_eq!(t.action(), EventAction::Created);
///
/// assert!(EventType::parse("movies.created").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventType {
    domain: String,
    entity: String,
    action: EventAction,
}

impl EventType {
    pub fn parse(raw: &str) -> Result<Self, AdmissionError> {
        let mut parts = raw.split('.');
        let (Some(domain), Some(entity), Some(action), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AdmissionError::invalid(
                "type",
                format!("'{raw}' must follow <domain>.<entity>.<action>"),
            ));
        };

        let value = Self {
            domain: domain.to_string(),
            entity: entity.to_string(),
            action: action.parse()?,
        };
        value.validate()?;
        Ok(value)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn action(&self) -> EventAction {
        self.action
    }
}

impl ValueObject for EventType {
    type Error = AdmissionError;

    fn validate(&self) -> Result<(), Self::Error> {
        let lower_word = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_lowercase());
        if !lower_word(&self.domain) || !lower_word(&self.entity) {
            return Err(AdmissionError::invalid(
                "type",
                format!(
                    "domain and entity must be lowercase letters, got '{}.{}'",
                    self.domain, self.entity
                ),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.domain, self.entity, self.action.as_str())
    }
}

impl TryFrom<String> for EventType {
    type Error = AdmissionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.to_string()
    }
}

/// 生产者来源路径，形如 `/movies/api`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcePath(String);

impl SourcePath {
    pub fn parse(raw: &str) -> Result<Self, AdmissionError> {
        let value = Self(raw.to_string());
        value.validate()?;
        Ok(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 首段路径（`/movies/api` → `movies`）
    pub fn module(&self) -> &str {
        self.0.trim_start_matches('/').split('/').next().unwrap_or_default()
    }
}

impl ValueObject for SourcePath {
    type Error = AdmissionError;

    fn validate(&self) -> Result<(), Self::Error> {
        let segment_ok = |s: &str| {
            !s.is_empty()
                && s
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
        };

        let valid = self
            .0
            .strip_prefix('/')
            .is_some_and(|rest| rest.split('/').all(segment_ok));

        if valid {
            Ok(())
        } else {
            Err(AdmissionError::invalid(
                "source",
                format!("'{}' must look like /module/api", self.0),
            ))
        }
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 内容类型，仅接受 `application/json` 及其带参数的变体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentType(String);

impl ContentType {
    pub const JSON: &'static str = "application/json";

    pub fn parse(raw: &str) -> Result<Self, AdmissionError> {
        let value = Self(raw.trim().to_string());
        value.validate()?;
        Ok(value)
    }

    pub fn json() -> Self {
        Self(Self::JSON.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for ContentType {
    type Error = AdmissionError;

    fn validate(&self) -> Result<(), Self::Error> {
        match self.0.strip_prefix(Self::JSON) {
            Some(rest) if rest.is_empty() || rest.starts_with(';') => Ok(()),
            _ => Err(AdmissionError::invalid(
                "datacontenttype",
                format!("'{}' must be application/json", self.0),
            )),
        }
    }
}

/// 消息 ID：幂等令牌与关联 ID，在每次重试中保持不变
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_accepts_three_lowercase_segments() {
        let t = EventType::parse("users.user.deleted").unwrap();
        assert_eq!(t.to_string(), "users.user.deleted");
        assert_eq!(t.action(), EventAction::Deleted);
    }

    #[test]
    fn event_type_rejects_malformed_input() {
        for raw in [
            "",
            "movies",
            "movies.movie",
            "movies.movie.rated",
            "Movies.movie.created",
            "movies.movie.created.extra",
            "movies2.movie.created",
            "movies..created",
        ] {
            let err = EventType::parse(raw).unwrap_err();
            assert!(!err.is_auth(), "{raw}");
        }
    }

    #[test]
    fn source_path_rules() {
        assert!(SourcePath::parse("/movies/api").is_ok());
        assert!(SourcePath::parse("/a.b_c-d").is_ok());
        assert!(SourcePath::parse("movies/api").is_err());
        assert!(SourcePath::parse("/movies//api").is_err());
        assert!(SourcePath::parse("/movies/api/").is_err());
        assert!(SourcePath::parse("/movies/a pi").is_err());
        assert_eq!(SourcePath::parse("/movies/api").unwrap().module(), "movies");
    }

    #[test]
    fn content_type_rules() {
        assert!(ContentType::parse("application/json").is_ok());
        assert!(ContentType::parse("application/json; charset=utf-8").is_ok());
        assert!(ContentType::parse("application/jsonx").is_err());
        assert!(ContentType::parse("text/plain").is_err());
    }

    #[test]
    fn event_type_serde_as_string() {
        let t = EventType::parse("social.follow.created").unwrap();
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"social.follow.created\"");
        let back: EventType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
        assert!(serde_json::from_str::<EventType>("\"bad\"").is_err());
    }
}
