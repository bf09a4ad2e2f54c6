//! MESSAGE_CREATE payload

use serde::{Deserialize, Serialize};

/// The subset of a MESSAGE_CREATE payload the bundled handlers read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageCreateEvent {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    pub author: MessageAuthor,
    #[serde(default)]
    pub content: String,
}

/// Author of a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageAuthor {
    pub id: String,
    #[serde(default)]
    pub username: String,
}
