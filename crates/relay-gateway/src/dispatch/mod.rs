//! Event dispatch
//!
//! Routes DISPATCH events to caller-registered handlers by event name.

mod error;
mod table;

pub use error::{HandlerError, HandlerResult};
pub use table::{DispatchEvent, DispatchTable, DispatchTableBuilder, EventHandler, HandlerFuture};
