use serde::{Deserialize, Serialize};

/// 无法识别模块前缀时使用的保留段
pub const UNCLASSIFIED: &str = "unclassified";

/// 路由结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// 主题路由键，形如 `<module>.<action>`
    pub routing_key: String,
    /// 广播（按通配绑定扇出）还是定向（单一消费组）
    pub broadcast: bool,
    /// 决定重试策略的模块：定向时为目标模块，广播时为类型首段
    pub module: String,
}

/// Router：事件类型 → 路由键
#[derive(Debug, Clone, Copy, Default)]
pub struct Router;

impl Router {
    /// 计算路由键
    ///
    /// ```
    /// use hub_domain::routing::Router;
    ///
    /// let broadcast = Router.route("movies.movie.created", None);
    /// assert_eq!(broadcast.routing_key, "movies.created");
    /// assert!(broadcast.broadcast);
    ///
    /// let targeted = Router.route("movies.movie.created", Some("analytics"));
    /// assert_eq!(targeted.routing_key, "analytics.created");
    /// assert!(!targeted.broadcast);
    /// ```
    pub fn route(&self, event_type: &str, target_module: Option<&str>) -> Route {
        let segments: Vec<&str> = event_type.trim().split('.').collect();
        let action = segments
            .last()
            .map(|s| sanitize(s))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNCLASSIFIED.to_string());

        if let Some(target) = target_module.map(sanitize).filter(|t| !t.is_empty()) {
            return Route {
                routing_key: format!("{target}.{action}"),
                broadcast: false,
                module: target,
            };
        }

        let module = match segments.as_slice() {
            [first, _, ..] => Some(sanitize(first)).filter(|m| !m.is_empty()),
            _ => None,
        }
        .unwrap_or_else(|| UNCLASSIFIED.to_string());

        Route {
            routing_key: format!("{module}.{action}"),
            broadcast: true,
            module,
        }
    }
}

// 小写化，`[a-z0-9_-]` 之外的字符替换为 `_`
fn sanitize(segment: &str) -> String {
    segment
        .trim()
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' | '-' => c,
            _ => '_',
        })
        .collect()
}
