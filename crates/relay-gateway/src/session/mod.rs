//! Gateway sessions
//!
//! The protocol state machine for one physical connection and the values it
//! hands back to the reconnect loop.

mod machine;
mod state;

pub use machine::GatewaySession;
pub use state::{CloseReason, ResumeState, SessionOutcome, SessionReport, SessionState};
