//! Gateway client
//!
//! One logical client: its configuration, backoff policy, transport and the
//! reconnect loop that strings sessions together.

mod backoff;
mod config;
mod status;
mod supervisor;
pub mod transport;

pub use backoff::{Backoff, BackoffPolicy};
pub use config::{Credentials, GatewayConfig, CLIENT_ID_LEN};
pub use status::ClientStatus;
pub use supervisor::{ClientExit, GatewayClient};
