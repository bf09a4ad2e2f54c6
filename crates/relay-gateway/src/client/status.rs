//! Client status

use serde::Serialize;

/// Lifecycle status of one logical client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    /// Registered, not started
    Pending,
    /// Opening a connection or waiting for READY
    Connecting,
    /// Session established (READY or RESUMED received)
    Ready,
    /// Sleeping before the next attempt
    BackingOff,
    /// Attempt budget spent
    Exhausted,
    /// Peer refused the credentials or configuration
    Rejected,
    /// Cancelled by shutdown
    Stopped,
    /// Client task panicked
    Failed,
}

impl ClientStatus {
    /// Check if the client is between start and a terminal status
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Connecting | Self::Ready | Self::BackingOff)
    }

    /// Check if the client has stopped for good
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exhausted | Self::Rejected | Self::Stopped | Self::Failed)
    }

    /// Lowercase name, as used in logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::BackingOff => "backing_off",
            Self::Exhausted => "exhausted",
            Self::Rejected => "rejected",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
