//! Gateway event types
//!
//! Event names carried in the `t` field of dispatch messages. The peer sends
//! many more than are listed here; unknown names are passed through as strings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dispatch event names known to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayEventType {
    // Session events, consumed by the session itself
    /// Sent after a successful Identify; carries the session id
    Ready,
    /// Sent after a successful Resume
    Resumed,

    // Events commonly registered by callers
    GuildCreate,
    GuildDelete,
    ChannelCreate,
    MessageCreate,
    MessageUpdate,
    MessageDelete,
    PresenceUpdate,
    TypingStart,
    SessionsReplace,
}

impl GatewayEventType {
    /// Get the string representation of the event type
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Resumed => "RESUMED",
            Self::GuildCreate => "GUILD_CREATE",
            Self::GuildDelete => "GUILD_DELETE",
            Self::ChannelCreate => "CHANNEL_CREATE",
            Self::MessageCreate => "MESSAGE_CREATE",
            Self::MessageUpdate => "MESSAGE_UPDATE",
            Self::MessageDelete => "MESSAGE_DELETE",
            Self::PresenceUpdate => "PRESENCE_UPDATE",
            Self::TypingStart => "TYPING_START",
            Self::SessionsReplace => "SESSIONS_REPLACE",
        }
    }

    /// Parse an event type from a string
    #[must_use]
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "READY" => Some(Self::Ready),
            "RESUMED" => Some(Self::Resumed),
            "GUILD_CREATE" => Some(Self::GuildCreate),
            "GUILD_DELETE" => Some(Self::GuildDelete),
            "CHANNEL_CREATE" => Some(Self::ChannelCreate),
            "MESSAGE_CREATE" => Some(Self::MessageCreate),
            "MESSAGE_UPDATE" => Some(Self::MessageUpdate),
            "MESSAGE_DELETE" => Some(Self::MessageDelete),
            "PRESENCE_UPDATE" => Some(Self::PresenceUpdate),
            "TYPING_START" => Some(Self::TypingStart),
            "SESSIONS_REPLACE" => Some(Self::SessionsReplace),
            _ => None,
        }
    }

    /// Whether the session state machine acts on this event itself
    #[must_use]
    pub const fn is_session_event(self) -> bool {
        matches!(self, Self::Ready | Self::Resumed)
    }
}

impl fmt::Display for GatewayEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<GatewayEventType> for String {
    fn from(event: GatewayEventType) -> Self {
        event.as_str().to_string()
    }
}
