//! Heartbeat management
//!
//! Keeps one physical connection alive after HELLO and detects read stalls.

mod manager;
mod state;

pub use manager::{acknowledge, send_heartbeat, HeartbeatConfig, HeartbeatExit, HeartbeatManager};
pub use state::HeartbeatState;
