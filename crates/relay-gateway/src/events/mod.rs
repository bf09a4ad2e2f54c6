//! Gateway events
//!
//! Names of the dispatch events the client understands, and the payloads it reads.

mod event_types;
mod message;
mod ready;

pub use event_types::GatewayEventType;
pub use message::{MessageAuthor, MessageCreateEvent};
pub use ready::{ReadyEvent, ReadyUser};
