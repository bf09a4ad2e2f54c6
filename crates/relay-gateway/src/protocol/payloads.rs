//! Payload definitions
//!
//! Shapes of the `d` field for the op codes the client sends or reads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload for op 10 (Hello)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

impl HelloPayload {
    /// Create a Hello payload with the given interval
    #[must_use]
    pub fn with_interval(heartbeat_interval: u64) -> Self {
        Self { heartbeat_interval }
    }
}

/// Payload for op 2 (Identify)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Account token
    pub token: String,

    /// Client capability bitfield
    pub capabilities: u64,

    /// Declared client properties
    pub properties: ClientProperties,

    /// Initial presence
    pub presence: PresenceUpdatePayload,

    /// Per-payload compression (always off, the transport compresses)
    pub compress: bool,

    /// Cached client state versions
    pub client_state: ClientState,
}

/// Client properties descriptor sent with Identify
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
    pub system_locale: String,
    pub browser_user_agent: String,
    pub browser_version: String,
    pub os_version: String,
    pub referrer: String,
    pub referring_domain: String,
    pub referrer_current: String,
    pub referring_domain_current: String,
    pub release_channel: String,
    pub client_build_number: u64,
    pub client_event_source: Option<String>,
}

impl ClientProperties {
    /// Default capability bitfield announced with these properties
    pub const DEFAULT_CAPABILITIES: u64 = 1021;

    /// Set operating system
    #[must_use]
    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    /// Set browser name and version
    #[must_use]
    pub fn with_browser(mut self, browser: impl Into<String>, version: impl Into<String>) -> Self {
        self.browser = browser.into();
        self.browser_version = version.into();
        self
    }

    /// Set the user agent string
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.browser_user_agent = user_agent.into();
        self
    }

    /// Set the client build number
    #[must_use]
    pub fn with_build_number(mut self, build: u64) -> Self {
        self.client_build_number = build;
        self
    }
}

impl Default for ClientProperties {
    fn default() -> Self {
        Self {
            os: "Linux".to_string(),
            browser: "Chrome".to_string(),
            device: String::new(),
            system_locale: "en-US".to_string(),
            browser_user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                                 (KHTML, like Gecko) Chrome/100.0.4896.127 Safari/537.36"
                .to_string(),
            browser_version: "100.0.4896.127".to_string(),
            os_version: String::new(),
            referrer: String::new(),
            referring_domain: String::new(),
            referrer_current: String::new(),
            referring_domain_current: String::new(),
            release_channel: "stable".to_string(),
            client_build_number: 149_345,
            client_event_source: None,
        }
    }
}

/// Cached state versions sent with Identify
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientState {
    pub guild_hashes: Map<String, Value>,
    pub highest_last_message_id: String,
    pub read_state_version: i64,
    pub user_guild_settings_version: i64,
    pub user_settings_version: i64,
    pub private_channels_version: String,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            guild_hashes: Map::new(),
            highest_last_message_id: "0".to_string(),
            read_state_version: 0,
            user_guild_settings_version: -1,
            user_settings_version: -1,
            private_channels_version: "0".to_string(),
        }
    }
}

/// Payload for op 3 (Presence Update), also embedded in Identify
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceUpdatePayload {
    /// Status (online, idle, dnd, invisible, offline)
    pub status: String,

    /// Unix time in milliseconds since the client went idle, 0 if not idle
    pub since: u64,

    /// Activities shown on the profile
    pub activities: Vec<Activity>,

    /// Whether the client is AFK
    pub afk: bool,
}

impl PresenceUpdatePayload {
    /// Valid status values
    pub const VALID_STATUSES: &'static [&'static str] =
        &["online", "idle", "dnd", "invisible", "offline"];

    /// Plain online presence with no activities
    #[must_use]
    pub fn online() -> Self {
        Self {
            status: "online".to_string(),
            since: 0,
            activities: Vec::new(),
            afk: false,
        }
    }

    /// Idle presence starting now
    #[must_use]
    pub fn idle() -> Self {
        Self {
            status: "idle".to_string(),
            since: chrono::Utc::now().timestamp_millis().max(0) as u64,
            activities: Vec::new(),
            afk: true,
        }
    }

    /// Add an activity
    #[must_use]
    pub fn with_activity(mut self, activity: Activity) -> Self {
        self.activities.push(activity);
        self
    }

    /// Check if the status is valid
    #[must_use]
    pub fn is_valid_status(&self) -> bool {
        Self::VALID_STATUSES.contains(&self.status.as_str())
    }
}

impl Default for PresenceUpdatePayload {
    fn default() -> Self {
        Self::online()
    }
}

/// A presence activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub name: String,

    /// Activity type (0 playing, 2 listening, 3 watching, 4 custom, 5 competing)
    #[serde(rename = "type")]
    pub kind: u8,

    pub state: Option<String>,

    pub emoji: Option<Value>,
}

impl Activity {
    /// Activity type of a custom status
    pub const CUSTOM: u8 = 4;

    /// A custom status line
    #[must_use]
    pub fn custom_status(state: impl Into<String>) -> Self {
        Self {
            name: "Custom Status".to_string(),
            kind: Self::CUSTOM,
            state: Some(state.into()),
            emoji: None,
        }
    }
}

/// Payload for op 6 (Resume)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    /// Account token
    pub token: String,

    /// Session ID to resume
    pub session_id: String,

    /// Last received sequence number
    pub seq: u64,
}
