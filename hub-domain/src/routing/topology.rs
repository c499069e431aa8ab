use bon::Builder;
use serde::{Deserialize, Serialize};

/// 队列及其绑定模式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueBinding {
    pub queue: String,
    pub patterns: Vec<String>,
}

impl QueueBinding {
    pub fn new(queue: impl Into<String>, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            queue: queue.into(),
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, routing_key: &str) -> bool {
        self.patterns.iter().any(|p| topic_matches(p, routing_key))
    }
}

/// 下游拓扑：一个主题交换机、按模块的持久队列、一个全量队列与死信交换机/队列
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    #[builder(into)]
    exchange: String,
    #[builder(into)]
    dead_letter_exchange: String,
    #[builder(into)]
    dead_letter_queue: String,
    #[builder(default)]
    queues: Vec<QueueBinding>,
}

impl Topology {
    pub const ALL_EVENTS_QUEUE: &'static str = "events.all";

    /// 标准拓扑：每个模块一个 `<module>.events` 队列绑定 `<module>.*`，外加 `#` 全量队列
    pub fn standard<'a>(exchange: &str, modules: impl IntoIterator<Item = &'a str>) -> Self {
        let mut queues: Vec<QueueBinding> = modules
            .into_iter()
            .map(|m| QueueBinding::new(format!("{m}.events"), [format!("{m}.*")]))
            .collect();
        queues.push(QueueBinding::new(Self::ALL_EVENTS_QUEUE, ["#"]));

        Self {
            exchange: exchange.to_string(),
            dead_letter_exchange: format!("{exchange}.dlx"),
            dead_letter_queue: format!("{exchange}.dlq"),
            queues,
        }
    }

    /// 追加兴趣绑定（例如 analytics 额外订阅 `ratings.*`）
    pub fn bind(mut self, queue: &str, pattern: &str) -> Self {
        match self.queues.iter_mut().find(|q| q.queue == queue) {
            Some(binding) => binding.patterns.push(pattern.to_string()),
            None => self.queues.push(QueueBinding::new(queue, [pattern])),
        }
        self
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn dead_letter_exchange(&self) -> &str {
        &self.dead_letter_exchange
    }

    pub fn dead_letter_queue(&self) -> &str {
        &self.dead_letter_queue
    }

    pub fn queues(&self) -> &[QueueBinding] {
        &self.queues
    }

    /// 路由键命中的所有队列名
    pub fn matching_queues(&self, routing_key: &str) -> Vec<&str> {
        self.queues
            .iter()
            .filter(|q| q.matches(routing_key))
            .map(|q| q.queue.as_str())
            .collect()
    }
}

/// AMQP 主题匹配：`*` 匹配恰好一个词，`#` 匹配零个或多个词
///
/// ```
/// use hub_domain::routing::topic_matches;
///
/// assert!(topic_matches("movies.*", "movies.created"));
/// assert!(!topic_matches("movies.*", "movies.movie.created"));
/// assert!(topic_matches("#", "anything.at.all"));
/// ```
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| match_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&head, tail)) => (word == "*" || word == head) && match_words(rest, tail),
            None => false,
        },
    }
}
