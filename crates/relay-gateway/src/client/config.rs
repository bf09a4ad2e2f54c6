//! Client configuration and credentials

use super::BackoffPolicy;
use crate::protocol::{Activity, ClientProperties, ClientState, PresenceUpdatePayload};
use relay_common::{BackoffSettings, GatewaySettings};
use std::time::Duration;

/// Length of the account id prefix of a token
pub const CLIENT_ID_LEN: usize = 18;

/// Connection settings shared by every client of a fleet
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway endpoint
    pub url: String,
    /// Connect timeout and read timeout while waiting for HELLO
    pub handshake_timeout: Duration,
    /// Subtracted from the heartbeat interval; also the send timeout
    pub heartbeat_margin: Duration,
    /// Ack latency above which a warning is logged
    pub latency_warning: Duration,
    /// Maximum WebSocket frame and message size
    pub max_frame_bytes: usize,
    /// Reconnect delays and attempt budget
    pub backoff: BackoffPolicy,
    /// Reset the attempt counter after a session stayed ready this long
    pub stable_reset_after: Option<Duration>,
    /// Client properties sent with IDENTIFY
    pub properties: ClientProperties,
    /// Capability bitfield sent with IDENTIFY
    pub capabilities: u64,
    /// Cached state versions sent with IDENTIFY
    pub client_state: ClientState,
    /// Presence embedded in IDENTIFY
    pub identify_presence: PresenceUpdatePayload,
    /// Presence sent after READY
    pub presence: PresenceUpdatePayload,
}

impl GatewayConfig {
    /// Build from the settings loaded by `relay-common`
    #[must_use]
    pub fn from_settings(gateway: &GatewaySettings, backoff: &BackoffSettings) -> Self {
        Self {
            url: gateway.url.clone(),
            handshake_timeout: Duration::from_millis(gateway.handshake_timeout_ms),
            heartbeat_margin: Duration::from_millis(gateway.heartbeat_margin_ms),
            latency_warning: Duration::from_millis(gateway.latency_warn_ms),
            max_frame_bytes: gateway.max_frame_bytes,
            backoff: BackoffPolicy::from_settings(backoff),
            stable_reset_after: backoff.stable_reset_secs.map(Duration::from_secs),
            ..Self::default()
        }
    }

    /// Point the config at another endpoint
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Replace the backoff policy
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replace the presence sent after READY
    #[must_use]
    pub fn with_presence(mut self, presence: PresenceUpdatePayload) -> Self {
        self.presence = presence;
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let gateway = GatewaySettings::default();
        Self {
            url: gateway.url,
            handshake_timeout: Duration::from_millis(gateway.handshake_timeout_ms),
            heartbeat_margin: Duration::from_millis(gateway.heartbeat_margin_ms),
            latency_warning: Duration::from_millis(gateway.latency_warn_ms),
            max_frame_bytes: gateway.max_frame_bytes,
            backoff: BackoffPolicy::default(),
            stable_reset_after: None,
            properties: ClientProperties::default(),
            capabilities: ClientProperties::DEFAULT_CAPABILITIES,
            client_state: ClientState::default(),
            identify_presence: PresenceUpdatePayload::online(),
            presence: PresenceUpdatePayload::online()
                .with_activity(Activity::custom_status("Hopelessly Devoted to You")),
        }
    }
}

/// Account token plus the client id derived from it
#[derive(Clone)]
pub struct Credentials {
    id: String,
    token: String,
}

impl Credentials {
    /// Wrap a token; the client id is its first 18 characters
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        let id = token.chars().take(CLIENT_ID_LEN).collect();
        Self { id, token }
    }

    /// Client id (account id prefix of the token)
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Raw token, only for IDENTIFY and RESUME payloads
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("id", &self.id)
            .field("token", &"<redacted>")
            .finish()
    }
}
