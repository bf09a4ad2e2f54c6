//! Gateway message format
//!
//! The `{op, d, s, t}` envelope shared by every message in both directions.

use super::{HelloPayload, IdentifyPayload, OpCode, PresenceUpdatePayload, ResumePayload};
use crate::events::ReadyEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway message envelope
///
/// `op` is kept raw so that op codes this client does not know still parse;
/// use [`GatewayMessage::opcode`] for the typed view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayMessage {
    /// Operation code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<u8>,

    /// Event data payload (`null` when absent)
    #[serde(default)]
    pub d: Value,

    /// Sequence number (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event name (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayMessage {
    fn with_op(op: OpCode, d: Value) -> Self {
        Self {
            op: Some(op.as_u8()),
            d,
            s: None,
            t: None,
        }
    }

    /// Typed op code, `None` if absent or unknown
    #[must_use]
    pub fn opcode(&self) -> Option<OpCode> {
        self.op.and_then(OpCode::from_u8)
    }

    // === Client Messages ===

    /// Create a Heartbeat message (op=1) carrying the last seen sequence
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self::with_op(
            OpCode::Heartbeat,
            last_sequence.map_or(Value::Null, |s| Value::Number(s.into())),
        )
    }

    /// Create an Identify message (op=2)
    #[must_use]
    pub fn identify(payload: &IdentifyPayload) -> Self {
        Self::with_op(OpCode::Identify, serde_json::to_value(payload).unwrap_or_default())
    }

    /// Create a Presence Update message (op=3)
    #[must_use]
    pub fn presence_update(payload: &PresenceUpdatePayload) -> Self {
        Self::with_op(
            OpCode::PresenceUpdate,
            serde_json::to_value(payload).unwrap_or_default(),
        )
    }

    /// Create a Resume message (op=6)
    #[must_use]
    pub fn resume(payload: &ResumePayload) -> Self {
        Self::with_op(OpCode::Resume, serde_json::to_value(payload).unwrap_or_default())
    }

    // === Peer Messages ===

    /// Create a Dispatch message (op=0)
    #[must_use]
    pub fn dispatch(event_type: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self {
            op: Some(OpCode::Dispatch.as_u8()),
            d: data,
            s: Some(sequence),
            t: Some(event_type.into()),
        }
    }

    /// Create a Hello message (op=10)
    #[must_use]
    pub fn hello(heartbeat_interval_ms: u64) -> Self {
        Self::with_op(
            OpCode::Hello,
            serde_json::to_value(HelloPayload::with_interval(heartbeat_interval_ms))
                .unwrap_or_default(),
        )
    }

    /// Create a Heartbeat ACK message (op=11)
    #[must_use]
    pub fn heartbeat_ack() -> Self {
        Self::with_op(OpCode::HeartbeatAck, Value::Null)
    }

    /// Create a Reconnect message (op=7)
    #[must_use]
    pub fn reconnect() -> Self {
        Self::with_op(OpCode::Reconnect, Value::Null)
    }

    /// Create an Invalid Session message (op=9)
    #[must_use]
    pub fn invalid_session(resumable: bool) -> Self {
        Self::with_op(OpCode::InvalidSession, Value::Bool(resumable))
    }

    // === Parsing ===

    /// Try to parse as a Hello payload (op=10)
    pub fn as_hello(&self) -> Option<HelloPayload> {
        if self.opcode() != Some(OpCode::Hello) {
            return None;
        }
        HelloPayload::deserialize(&self.d).ok()
    }

    /// Try to parse as a READY dispatch
    pub fn as_ready(&self) -> Option<ReadyEvent> {
        if self.opcode() != Some(OpCode::Dispatch) || self.t.as_deref() != Some("READY") {
            return None;
        }
        ReadyEvent::deserialize(&self.d).ok()
    }

    /// Sequence number carried by a heartbeat (op=1)
    pub fn as_heartbeat_seq(&self) -> Option<Option<u64>> {
        if self.opcode() != Some(OpCode::Heartbeat) {
            return None;
        }
        Some(self.d.as_u64())
    }

    // === Utilities ===

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.opcode(), self.op) {
            (Some(op), _) => write!(f, "GatewayMessage(op={op}")?,
            (None, Some(raw)) => write!(f, "GatewayMessage(op=unknown ({raw})")?,
            (None, None) => write!(f, "GatewayMessage(op=none")?,
        }
        if let Some(t) = &self.t {
            write!(f, ", t={t}")?;
        }
        if let Some(s) = self.s {
            write!(f, ", s={s}")?;
        }
        write!(f, ")")
    }
}
