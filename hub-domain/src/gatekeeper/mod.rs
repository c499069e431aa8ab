//! 生产者准入（gatekeeper）
//!
//! 负责入站事件的鉴权与校验：
//! - `CredentialRegistry`：API Key → 授权来源与允许的事件类型前缀（启动时加载，运行期只读）；
//! - `IncomingEvent`：生产者提交的事件信封（宽松的时间解析）；
//! - `Gatekeeper`：先鉴权、后校验，产出 `AdmittedEvent` 或 `AdmissionError`。
//!
//! 纯同步、无副作用，不做任何 I/O。
//!
mod credential;
mod envelope;
mod gatekeeper;

pub use credential::{Credential, CredentialRegistry};
pub use envelope::{AdmittedEvent, IncomingEvent, parse_lenient_datetime};
pub use gatekeeper::{Gatekeeper, GatekeeperConfig};
