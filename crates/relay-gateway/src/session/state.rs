//! Session state types

use crate::protocol::CloseCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Protocol state of one physical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Connected, waiting for HELLO
    AwaitingHello,
    /// IDENTIFY or RESUME sent, heartbeat running
    SteadyState,
    /// Peer asked for a reconnect; session kept
    Resuming,
    /// Peer dropped the session
    Invalidated,
    /// Connection torn down
    Closed,
}

/// What survives a physical connection for the next handshake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeState {
    /// Session id from READY
    pub session_id: Option<String>,
    /// Last seen sequence number
    pub sequence: Option<u64>,
}

impl ResumeState {
    /// Forget the session; the next handshake will IDENTIFY
    pub fn clear(&mut self) {
        self.session_id = None;
        self.sequence = None;
    }

    /// Session id and sequence, if both are known
    #[must_use]
    pub fn resume_info(&self) -> Option<(&str, u64)> {
        Some((self.session_id.as_deref()?, self.sequence?))
    }

    /// Check if the next handshake can RESUME
    #[must_use]
    pub fn can_resume(&self) -> bool {
        self.resume_info().is_some()
    }
}

/// Why a connection was closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// No inbound traffic within the heartbeat interval
    Stalled,
    /// A heartbeat could not be sent in time
    HeartbeatSendTimeout,
    /// No HELLO within the handshake timeout
    HandshakeTimeout,
    /// No frame within the negotiated interval
    ReadTimeout,
    /// Undecodable data or an op out of place
    Desync(String),
    /// Peer sent a close frame
    PeerClosed(Option<u16>),
    /// Socket error or end of stream
    Transport(String),
    /// Shutdown requested
    Cancelled,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stalled => write!(f, "connection stalled"),
            Self::HeartbeatSendTimeout => write!(f, "heartbeat send timed out"),
            Self::HandshakeTimeout => write!(f, "no HELLO within handshake timeout"),
            Self::ReadTimeout => write!(f, "read timed out"),
            Self::Desync(detail) => write!(f, "protocol desync: {detail}"),
            Self::PeerClosed(Some(code)) => write!(f, "peer closed with code {code}"),
            Self::PeerClosed(None) => write!(f, "peer closed"),
            Self::Transport(detail) => write!(f, "transport failure: {detail}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Reconnect now and RESUME
    Resuming {
        session_id: Option<String>,
        sequence: Option<u64>,
    },
    /// Session dropped; the next handshake will IDENTIFY
    Invalidated,
    /// Connection lost; resume state kept
    Closed(CloseReason),
    /// Peer refused the client for good
    Rejected(CloseCode),
}

/// Result of running one session to completion
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// How the session ended
    pub outcome: SessionOutcome,
    /// State to carry into the next connection
    pub resume: ResumeState,
    /// Time spent ready, if READY or RESUMED arrived
    pub steady_for: Option<Duration>,
}
