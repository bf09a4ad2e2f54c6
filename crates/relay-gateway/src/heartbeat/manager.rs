//! Heartbeat manager
//!
//! One task per physical connection, started after HELLO. Each tick it either
//! declares the connection stalled or sends a HEARTBEAT carrying the latest
//! sequence number.

use super::HeartbeatState;
use crate::client::transport::Outbound;
use crate::error::GatewayError;
use crate::protocol::GatewayMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Shortest tick period the manager will run with
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Largest share of the interval the margin may take
const MAX_MARGIN_DIVISOR: u32 = 4;

/// Timing for one heartbeat manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval dictated by the peer in HELLO
    pub interval: Duration,
    /// Safety margin subtracted from the interval; also the send timeout.
    /// Capped at a quarter of the interval.
    pub margin: Duration,
    /// Ack latency above which a warning is logged
    pub latency_warning: Duration,
}

impl HeartbeatConfig {
    /// Margin in effect for this interval
    #[must_use]
    pub fn effective_margin(&self) -> Duration {
        self.margin.min(self.interval / MAX_MARGIN_DIVISOR)
    }

    /// Tick period, `interval - margin`, never below 1 ms
    #[must_use]
    pub fn period(&self) -> Duration {
        self.interval
            .saturating_sub(self.effective_margin())
            .max(MIN_PERIOD)
    }

    /// Time allowed for one heartbeat to reach the socket
    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        self.effective_margin().max(MIN_PERIOD)
    }
}

/// Why the heartbeat task stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatExit {
    /// No inbound traffic for longer than the interval
    Stalled,
    /// A heartbeat was not written to the socket within the margin
    SendTimeout,
    /// The writer side of the connection is gone
    ChannelClosed,
    /// The session was closed by someone else
    Closed,
}

/// Periodic heartbeat sender and stall detector
pub struct HeartbeatManager {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    outbound: mpsc::Sender<Outbound>,
    closed: CancellationToken,
    client_id: Arc<str>,
}

impl HeartbeatManager {
    /// Create a manager for one physical connection
    #[must_use]
    pub fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        outbound: mpsc::Sender<Outbound>,
        closed: CancellationToken,
        client_id: Arc<str>,
    ) -> Self {
        Self {
            config,
            state,
            outbound,
            closed,
            client_id,
        }
    }

    /// Run the manager on its own task
    pub fn spawn(self) -> JoinHandle<HeartbeatExit> {
        tokio::spawn(self.run())
    }

    /// Tick until the connection stalls, a send fails, or the session closes
    ///
    /// Any exit other than [`HeartbeatExit::Closed`] marks the session closed.
    pub async fn run(self) -> HeartbeatExit {
        let period = self.config.period();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(
            client_id = %self.client_id,
            interval_ms = self.config.interval.as_millis() as u64,
            period_ms = period.as_millis() as u64,
            "Heartbeat started"
        );

        let exit = loop {
            tokio::select! {
                biased;
                () = self.closed.cancelled() => break HeartbeatExit::Closed,
                _ = ticker.tick() => {}
            }

            let silent_for = self.state.since_last_recv();
            if silent_for > self.config.interval {
                tracing::warn!(
                    client_id = %self.client_id,
                    silent_ms = silent_for.as_millis() as u64,
                    interval_ms = self.config.interval.as_millis() as u64,
                    "Connection stalled, no traffic within the heartbeat interval"
                );
                break HeartbeatExit::Stalled;
            }

            match send_heartbeat(&self.outbound, &self.state, self.config.send_timeout()).await {
                Ok(()) => {}
                Err(GatewayError::SendTimeout) => {
                    tracing::warn!(client_id = %self.client_id, "Heartbeat send timed out");
                    break HeartbeatExit::SendTimeout;
                }
                Err(e) => {
                    tracing::debug!(client_id = %self.client_id, error = %e, "Heartbeat channel closed");
                    break HeartbeatExit::ChannelClosed;
                }
            }
        };

        if exit != HeartbeatExit::Closed {
            self.closed.cancel();
        }

        tracing::debug!(client_id = %self.client_id, exit = ?exit, "Heartbeat stopped");
        exit
    }
}

/// Send a HEARTBEAT carrying the current sequence and record the send time
///
/// Completes once the writer has put the frame on the socket; `timeout`
/// bounds queueing and the write together. Used both by the periodic tick
/// and for peer-requested heartbeats.
pub async fn send_heartbeat(
    outbound: &mpsc::Sender<Outbound>,
    state: &HeartbeatState,
    timeout: Duration,
) -> Result<(), GatewayError> {
    let (frame, receipt) = Outbound::with_receipt(GatewayMessage::heartbeat(state.sequence()));
    let delivery = async {
        outbound
            .send(frame)
            .await
            .map_err(|_| GatewayError::ChannelClosed)?;
        receipt.await.map_err(|_| GatewayError::ChannelClosed)
    };

    let written_at = tokio::time::timeout(timeout, delivery)
        .await
        .map_err(|_| GatewayError::SendTimeout)??;
    state.record_send_at(written_at);
    tracing::trace!(sequence = ?state.sequence(), "Heartbeat sent");
    Ok(())
}

/// Record a HEARTBEAT_ACK and warn when the round trip is slow
///
/// Latency is advisory only; a slow ack never closes the session.
pub fn acknowledge(
    state: &HeartbeatState,
    latency_warning: Duration,
    client_id: &str,
) -> Option<Duration> {
    let latency = state.record_ack()?;
    let latency_ms = latency.as_millis() as u64;

    if latency > latency_warning {
        tracing::warn!(
            client_id = %client_id,
            latency_ms,
            "Gateway is falling behind, heartbeat ack took too long"
        );
    } else {
        tracing::trace!(client_id = %client_id, latency_ms, "Heartbeat acknowledged");
    }

    Some(latency)
}
