//! # relay-gateway
//!
//! Client-side protocol engine for a Discord-gateway-v9-style push endpoint:
//! zlib-stream decoding, session handshake and resume, heartbeats, reconnect
//! backoff and a fleet supervisor running many accounts side by side.

pub mod client;
pub mod codec;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod fleet;
pub mod heartbeat;
pub mod protocol;
pub mod session;

pub use client::{ClientExit, ClientStatus, Credentials, GatewayClient, GatewayConfig};
pub use dispatch::{DispatchEvent, DispatchTable, HandlerError, HandlerResult};
pub use error::{GatewayError, GatewayResult};
pub use fleet::{FleetReport, FleetSupervisor};
