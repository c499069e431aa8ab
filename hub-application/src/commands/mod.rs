mod admit_and_publish;
mod requeue_event;

pub use admit_and_publish::{AdmitAndPublish, AdmitAndPublishHandler};
pub use requeue_event::{RequeueEvent, RequeueEventHandler};
