mod get_event;
mod list_events;

pub use get_event::{GetEvent, GetEventHandler};
pub use list_events::{ListEvents, ListEventsHandler};
