//! READY payload
//!
//! Only the fields the session layer needs; everything else stays in the raw
//! value handed to the caller's READY handler.

use serde::{Deserialize, Serialize};

/// Payload of the READY dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyEvent {
    /// Session id to use for Resume
    pub session_id: String,

    /// Authenticated account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<ReadyUser>,
}

/// The authenticated account in READY
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyUser {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
}

impl ReadyUser {
    /// `name#1234` for legacy accounts, bare username otherwise
    #[must_use]
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some(d) if d != "0" && d != "0000" => format!("{}#{d}", self.username),
            _ => self.username.clone(),
        }
    }
}
