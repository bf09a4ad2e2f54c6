//! Heartbeat state shared between the reader loop and the heartbeat task

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Inner {
    last_send: Option<Instant>,
    last_ack: Option<Instant>,
    last_recv: Instant,
    latency: Option<Duration>,
    sequence: Option<u64>,
}

/// Timing and sequence bookkeeping for one physical connection
///
/// `last_recv` moves on any inbound traffic and is the only input to stall
/// detection; `last_ack` moves on HEARTBEAT_ACK only.
#[derive(Debug)]
pub struct HeartbeatState {
    inner: Mutex<Inner>,
}

impl HeartbeatState {
    /// Create state for a fresh connection, seeded with a resumed sequence
    #[must_use]
    pub fn new(sequence: Option<u64>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                last_send: None,
                last_ack: None,
                last_recv: Instant::now(),
                latency: None,
                sequence,
            }),
        }
    }

    /// Record inbound traffic of any kind
    pub fn record_recv(&self) {
        self.inner.lock().last_recv = Instant::now();
    }

    /// Record that a heartbeat went out
    pub fn record_send(&self) {
        self.record_send_at(Instant::now());
    }

    /// Record that a heartbeat was written at `at`
    pub fn record_send_at(&self, at: Instant) {
        self.inner.lock().last_send = Some(at);
    }

    /// Record a HEARTBEAT_ACK, returning the measured latency
    ///
    /// Returns `None` when no heartbeat has been sent yet.
    pub fn record_ack(&self) -> Option<Duration> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.last_ack = Some(now);
        let latency = inner.last_send.map(|sent| now.saturating_duration_since(sent));
        if latency.is_some() {
            inner.latency = latency;
        }
        latency
    }

    /// Store a sequence number; lower values never move it backwards
    pub fn set_sequence(&self, sequence: u64) {
        let mut inner = self.inner.lock();
        inner.sequence = Some(inner.sequence.map_or(sequence, |s| s.max(sequence)));
    }

    /// Forget the sequence number (session invalidated)
    pub fn clear_sequence(&self) {
        self.inner.lock().sequence = None;
    }

    /// Last seen sequence number
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.inner.lock().sequence
    }

    /// Last measured round-trip latency
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.inner.lock().latency
    }

    /// Time of the last HEARTBEAT_ACK
    #[must_use]
    pub fn last_ack(&self) -> Option<Instant> {
        self.inner.lock().last_ack
    }

    /// Time of the last heartbeat sent
    #[must_use]
    pub fn last_send(&self) -> Option<Instant> {
        self.inner.lock().last_send
    }

    /// Time elapsed since any inbound traffic
    #[must_use]
    pub fn since_last_recv(&self) -> Duration {
        self.inner.lock().last_recv.elapsed()
    }
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new(None)
    }
}
