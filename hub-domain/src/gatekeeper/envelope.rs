use crate::value_object::{ContentType, EventType, MessageId, SourcePath};
use bon::Builder;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// 生产者提交的事件信封（尚未鉴权/校验）
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingEvent {
    /// 生产者自带的事件 ID，存在时作为幂等令牌（messageId）
    #[serde(default)]
    id: Option<String>,
    /// 事件类型 `<domain>.<entity>.<action>`
    #[serde(rename = "type")]
    event_type: String,
    /// 生产者来源，例如 `/movies/api`
    source: String,
    /// 负载内容类型
    #[serde(rename = "datacontenttype", default)]
    content_type: Option<String>,
    /// 生产者声明的事件时间；缺省时由服务端赋值
    #[serde(default, deserialize_with = "deserialize_lenient")]
    sys_date: Option<DateTime<Utc>>,
    /// 事件负载
    #[serde(default)]
    data: Value,
    /// 显式目标模块（定向投递）
    #[serde(default)]
    target_module: Option<String>,
}

impl IncomingEvent {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn sys_date(&self) -> Option<DateTime<Utc>> {
        self.sys_date
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn target_module(&self) -> Option<&str> {
        self.target_module.as_deref()
    }

    /// 生产者未提供 `id` 时使用给定值（例如入口层的幂等键）
    pub fn or_id(mut self, id: impl Into<String>) -> Self {
        if self.id.as_deref().is_none_or(|s| s.trim().is_empty()) {
            self.id = Some(id.into());
        }
        self
    }

    pub(crate) fn into_data(self) -> Value {
        self.data
    }
}

/// 通过准入的事件，字段均已校验
#[derive(Debug, Clone, Builder)]
pub struct AdmittedEvent {
    message_id: MessageId,
    event_type: EventType,
    source: SourcePath,
    content_type: ContentType,
    /// 事件时间（生产者声明或服务端赋值）
    occurred_at: DateTime<Utc>,
    payload: Value,
    target_module: Option<String>,
}

impl AdmittedEvent {
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn source(&self) -> &SourcePath {
        &self.source
    }

    pub fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn target_module(&self) -> Option<&str> {
        self.target_module.as_deref()
    }
}

/// 宽松的时间解析：带时区偏移的 RFC 3339，或不带偏移的本地时间（按 UTC 处理）
///
/// ```
/// use hub_domain::gatekeeper::parse_lenient_datetime;
///
/// let a = parse_lenient_datetime("2025-10-13T15:43:00-03:00").unwrap();
/// let b = parse_lenient_datetime("2025-10-13T18:43:00").unwrap();
/// assert_eq!(a, b);
/// ```
pub fn parse_lenient_datetime(text: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(text) {
        return Ok(with_offset.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|local| local.and_utc())
        .map_err(|e| {
            format!("unrecognized date '{text}', expected ISO-8601 with or without offset: {e}")
        })
}

fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse_lenient_datetime(text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn decodes_cloud_event_shape() {
        let ev: IncomingEvent = serde_json::from_value(serde_json::json!({
            "id": "evt-1",
            "type": "movies.movie.created",
            "source": "/movies/api",
            "datacontenttype": "application/json",
            "sysDate": "2025-10-13T15:43:00Z",
            "data": {"movieId": 7},
            "targetModule": "analytics"
        }))
        .unwrap();

        assert_eq!(ev.id(), Some("evt-1"));
        assert_eq!(ev.event_type(), "movies.movie.created");
        assert_eq!(ev.content_type(), Some("application/json"));
        assert_eq!(
            ev.sys_date(),
            Some(Utc.with_ymd_and_hms(2025, 10, 13, 15, 43, 0).unwrap())
        );
        assert_eq!(ev.target_module(), Some("analytics"));
    }

    #[test]
    fn missing_or_blank_sys_date_is_none() {
        let missing: IncomingEvent = serde_json::from_value(serde_json::json!({
            "type": "movies.movie.created",
            "source": "/movies/api",
            "data": {}
        }))
        .unwrap();
        assert!(missing.sys_date().is_none());
        assert!(missing.id().is_none());

        let blank: IncomingEvent = serde_json::from_value(serde_json::json!({
            "type": "movies.movie.created",
            "source": "/movies/api",
            "sysDate": "  ",
            "data": {}
        }))
        .unwrap();
        assert!(blank.sys_date().is_none());
    }

    #[test]
    fn local_time_with_fraction_is_utc() {
        let parsed = parse_lenient_datetime("2025-10-13T15:43:00.250").unwrap();
        assert_eq!(parsed.timestamp_subsec_millis(), 250);
        assert!(parse_lenient_datetime("13/10/2025").is_err());
    }

    #[test]
    fn garbage_sys_date_fails_decoding() {
        let res = serde_json::from_value::<IncomingEvent>(serde_json::json!({
            "type": "movies.movie.created",
            "source": "/movies/api",
            "sysDate": "yesterday",
            "data": {}
        }));
        assert!(res.is_err());
    }
}
