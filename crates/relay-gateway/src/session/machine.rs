//! Session state machine
//!
//! Drives one physical connection from HELLO to teardown: performs the
//! IDENTIFY/RESUME handshake, tracks the sequence number, answers heartbeat
//! traffic and forwards DISPATCH events to the dispatch table.

use super::{CloseReason, ResumeState, SessionOutcome, SessionReport, SessionState};
use crate::client::transport::Outbound;
use crate::client::{ClientStatus, Credentials, GatewayConfig};
use crate::codec::FrameDecoder;
use crate::dispatch::{DispatchEvent, DispatchTable};
use crate::error::GatewayError;
use crate::events::GatewayEventType;
use crate::heartbeat::{
    acknowledge, send_heartbeat, HeartbeatConfig, HeartbeatExit, HeartbeatManager, HeartbeatState,
};
use crate::protocol::{CloseCode, GatewayMessage, IdentifyPayload, OpCode, ResumePayload};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

/// One physical connection's protocol session
pub struct GatewaySession {
    config: Arc<GatewayConfig>,
    credentials: Arc<Credentials>,
    dispatch: Arc<DispatchTable>,
    client_id: Arc<str>,
    state: SessionState,
    resume: ResumeState,
    decoder: FrameDecoder,
    heartbeat: Arc<HeartbeatState>,
    heartbeat_task: Option<JoinHandle<HeartbeatExit>>,
    interval: Option<Duration>,
    ready_at: Option<Instant>,
    outbound: mpsc::Sender<Outbound>,
    closed: CancellationToken,
    status: Arc<watch::Sender<ClientStatus>>,
}

impl GatewaySession {
    /// Create a session for a freshly opened connection
    ///
    /// `outbound` feeds the connection's writer task. `closed` is the
    /// connection's close signal; cancelling it from outside ends the session.
    #[must_use]
    pub fn new(
        config: Arc<GatewayConfig>,
        credentials: Arc<Credentials>,
        dispatch: Arc<DispatchTable>,
        resume: ResumeState,
        outbound: mpsc::Sender<Outbound>,
        closed: CancellationToken,
        status: Arc<watch::Sender<ClientStatus>>,
    ) -> Self {
        let client_id: Arc<str> = Arc::from(credentials.id());
        let heartbeat = Arc::new(HeartbeatState::new(resume.sequence));
        Self {
            config,
            credentials,
            dispatch,
            client_id,
            state: SessionState::AwaitingHello,
            resume,
            decoder: FrameDecoder::new(),
            heartbeat,
            heartbeat_task: None,
            interval: None,
            ready_at: None,
            outbound,
            closed,
            status,
        }
    }

    /// Current protocol state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Shared heartbeat bookkeeping for this connection
    #[must_use]
    pub fn heartbeat_state(&self) -> Arc<HeartbeatState> {
        self.heartbeat.clone()
    }

    /// Read frames until the session ends
    pub async fn run<S>(mut self, mut inbound: S) -> SessionReport
    where
        S: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        let outcome = loop {
            let read_timeout = self.interval.unwrap_or(self.config.handshake_timeout);

            let next = tokio::select! {
                biased;
                () = self.closed.cancelled() => break self.closed_outcome().await,
                next = tokio::time::timeout(read_timeout, inbound.next()) => next,
            };

            match next {
                Err(_) => {
                    let reason = if self.interval.is_some() {
                        CloseReason::ReadTimeout
                    } else {
                        CloseReason::HandshakeTimeout
                    };
                    tracing::warn!(
                        client_id = %self.client_id,
                        timeout_ms = read_timeout.as_millis() as u64,
                        "Gateway message timeout"
                    );
                    break SessionOutcome::Closed(reason);
                }
                Ok(None) => {
                    break SessionOutcome::Closed(CloseReason::Transport("stream ended".to_string()));
                }
                Ok(Some(Err(e))) => {
                    tracing::warn!(client_id = %self.client_id, error = %e, "WebSocket error");
                    break SessionOutcome::Closed(CloseReason::Transport(e.to_string()));
                }
                Ok(Some(Ok(frame))) => {
                    if let Some(outcome) = self.handle_frame(frame).await {
                        break outcome;
                    }
                }
            }
        };

        self.finish(outcome).await
    }

    async fn handle_frame(&mut self, frame: Message) -> Option<SessionOutcome> {
        let decoded = match frame {
            Message::Binary(bytes) => {
                self.heartbeat.record_recv();
                match self.decoder.feed(&bytes) {
                    Ok(Some(message)) => Ok(message),
                    Ok(None) => return None,
                    Err(e) => Err(e),
                }
            }
            Message::Text(text) => {
                self.heartbeat.record_recv();
                self.decoder.decode_text(&text)
            }
            Message::Ping(_) | Message::Pong(_) => {
                self.heartbeat.record_recv();
                return None;
            }
            Message::Close(frame) => {
                let code = frame.map(|f| u16::from(f.code));
                return Some(self.on_close(code));
            }
            Message::Frame(_) => return None,
        };

        match decoded {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                tracing::warn!(client_id = %self.client_id, error = %e, "Failed to decode gateway message");
                Some(SessionOutcome::Closed(CloseReason::Desync(e.to_string())))
            }
        }
    }

    async fn handle_message(&mut self, message: GatewayMessage) -> Option<SessionOutcome> {
        let Some(op) = message.opcode() else {
            tracing::debug!(client_id = %self.client_id, op = ?message.op, "Ignoring unknown op code");
            return None;
        };

        tracing::trace!(client_id = %self.client_id, op = %op, sequence = ?message.s, "Received message");

        match (op, self.state) {
            (OpCode::Reconnect, _) => {
                tracing::info!(client_id = %self.client_id, "Gateway requested reconnect");
                self.closed.cancel();
                Some(SessionOutcome::Resuming {
                    session_id: self.resume.session_id.clone(),
                    sequence: self.resume.sequence,
                })
            }
            (OpCode::InvalidSession, _) => {
                tracing::info!(
                    client_id = %self.client_id,
                    resumable = ?message.d.as_bool(),
                    "Session invalidated"
                );
                self.invalidate();
                self.closed.cancel();
                Some(SessionOutcome::Invalidated)
            }
            (OpCode::Hello, SessionState::AwaitingHello) => self.on_hello(&message).await,
            (OpCode::Dispatch, SessionState::SteadyState) => self.on_dispatch(message).await,
            (OpCode::HeartbeatAck, SessionState::SteadyState) => {
                acknowledge(&self.heartbeat, self.config.latency_warning, &self.client_id);
                None
            }
            (OpCode::Heartbeat, SessionState::SteadyState) => {
                tracing::debug!(client_id = %self.client_id, "Gateway requested heartbeat");
                self.check_send(
                    send_heartbeat(&self.outbound, &self.heartbeat, self.send_timeout()).await,
                )
            }
            (op, state) => {
                tracing::warn!(client_id = %self.client_id, op = %op, state = ?state, "Unexpected op code");
                Some(SessionOutcome::Closed(CloseReason::Desync(format!(
                    "{op} received in {state:?}"
                ))))
            }
        }
    }

    async fn on_hello(&mut self, message: &GatewayMessage) -> Option<SessionOutcome> {
        let Some(hello) = message.as_hello() else {
            return Some(SessionOutcome::Closed(CloseReason::Desync(
                "malformed HELLO payload".to_string(),
            )));
        };

        let interval = Duration::from_millis(hello.heartbeat_interval);
        self.interval = Some(interval);

        let handshake = match self.resume.resume_info() {
            Some((session_id, sequence)) => {
                tracing::info!(client_id = %self.client_id, sequence, "Resuming session");
                GatewayMessage::resume(&ResumePayload {
                    token: self.credentials.token().to_string(),
                    session_id: session_id.to_string(),
                    seq: sequence,
                })
            }
            None => {
                tracing::info!(client_id = %self.client_id, "Identifying");
                GatewayMessage::identify(&IdentifyPayload {
                    token: self.credentials.token().to_string(),
                    capabilities: self.config.capabilities,
                    properties: self.config.properties.clone(),
                    presence: self.config.identify_presence.clone(),
                    compress: false,
                    client_state: self.config.client_state.clone(),
                })
            }
        };

        if let Some(outcome) = self.check_send(self.send(handshake).await) {
            return Some(outcome);
        }

        let manager = HeartbeatManager::new(
            self.heartbeat_config(interval),
            self.heartbeat.clone(),
            self.outbound.clone(),
            self.closed.clone(),
            self.client_id.clone(),
        );
        self.heartbeat_task = Some(manager.spawn());
        self.state = SessionState::SteadyState;

        tracing::debug!(
            client_id = %self.client_id,
            heartbeat_interval_ms = hello.heartbeat_interval,
            "Handshake sent"
        );
        None
    }

    async fn on_dispatch(&mut self, message: GatewayMessage) -> Option<SessionOutcome> {
        if let Some(sequence) = message.s {
            self.heartbeat.set_sequence(sequence);
            self.resume.sequence = self.heartbeat.sequence();
        }

        let Some(name) = message.t.clone() else {
            tracing::debug!(client_id = %self.client_id, "Ignoring dispatch without event name");
            return None;
        };

        match GatewayEventType::from_name(&name) {
            Some(GatewayEventType::Ready) => {
                let Some(ready) = message.as_ready() else {
                    return Some(SessionOutcome::Closed(CloseReason::Desync(
                        "READY without session_id".to_string(),
                    )));
                };
                tracing::info!(
                    client_id = %self.client_id,
                    sequence = ?message.s,
                    "Client ready"
                );
                self.resume.session_id = Some(ready.session_id);
                self.mark_ready();

                let presence = GatewayMessage::presence_update(&self.config.presence);
                if let Some(outcome) = self.check_send(self.send(presence).await) {
                    return Some(outcome);
                }
            }
            Some(GatewayEventType::Resumed) => {
                tracing::info!(
                    client_id = %self.client_id,
                    sequence = ?self.resume.sequence,
                    "Session resumed"
                );
                self.mark_ready();
                return None;
            }
            _ => {}
        }

        self.dispatch.dispatch(DispatchEvent {
            client_id: self.client_id.clone(),
            name,
            sequence: message.s,
            data: message.d,
        });
        None
    }

    fn on_close(&mut self, code: Option<u16>) -> SessionOutcome {
        tracing::info!(client_id = %self.client_id, code = ?code, "Gateway closed the connection");

        match code.and_then(CloseCode::from_u16) {
            Some(code) if !code.should_reconnect() => {
                tracing::error!(client_id = %self.client_id, code = %code, "Gateway rejected the client");
                SessionOutcome::Rejected(code)
            }
            Some(code) if code.invalidates_session() => {
                self.invalidate();
                SessionOutcome::Invalidated
            }
            _ => SessionOutcome::Closed(CloseReason::PeerClosed(code)),
        }
    }

    fn invalidate(&mut self) {
        self.resume.clear();
        self.heartbeat.clear_sequence();
    }

    fn mark_ready(&mut self) {
        self.ready_at = Some(Instant::now());
        self.status.send_replace(ClientStatus::Ready);
    }

    fn heartbeat_config(&self, interval: Duration) -> HeartbeatConfig {
        HeartbeatConfig {
            interval,
            margin: self.config.heartbeat_margin,
            latency_warning: self.config.latency_warning,
        }
    }

    fn send_timeout(&self) -> Duration {
        match self.interval {
            Some(interval) => self.heartbeat_config(interval).send_timeout(),
            None => self.config.heartbeat_margin.max(Duration::from_millis(1)),
        }
    }

    async fn send(&self, message: GatewayMessage) -> Result<(), GatewayError> {
        if self.closed.is_cancelled() {
            return Err(GatewayError::SessionClosed);
        }
        match tokio::time::timeout(self.send_timeout(), self.outbound.send(message.into())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(GatewayError::ChannelClosed),
            Err(_) => Err(GatewayError::SendTimeout),
        }
    }

    fn check_send(&self, result: Result<(), GatewayError>) -> Option<SessionOutcome> {
        let e = result.err()?;
        tracing::warn!(client_id = %self.client_id, error = %e, "Failed to send message");
        Some(SessionOutcome::Closed(match e {
            GatewayError::SendTimeout => CloseReason::HeartbeatSendTimeout,
            GatewayError::SessionClosed => CloseReason::Cancelled,
            other => CloseReason::Transport(other.to_string()),
        }))
    }

    /// Map a close signal raised elsewhere to the reason behind it
    async fn closed_outcome(&mut self) -> SessionOutcome {
        let exit = match self.heartbeat_task.take() {
            Some(task) => task.await.ok(),
            None => None,
        };

        SessionOutcome::Closed(match exit {
            Some(HeartbeatExit::Stalled) => CloseReason::Stalled,
            Some(HeartbeatExit::SendTimeout) => CloseReason::HeartbeatSendTimeout,
            Some(HeartbeatExit::ChannelClosed) => CloseReason::Transport("writer closed".to_string()),
            Some(HeartbeatExit::Closed) | None if self.outbound.is_closed() => {
                CloseReason::Transport("writer closed".to_string())
            }
            Some(HeartbeatExit::Closed) | None => CloseReason::Cancelled,
        })
    }

    async fn finish(mut self, outcome: SessionOutcome) -> SessionReport {
        self.closed.cancel();
        if let Some(task) = self.heartbeat_task.take() {
            task.await.ok();
        }

        self.state = match outcome {
            SessionOutcome::Resuming { .. } => SessionState::Resuming,
            SessionOutcome::Invalidated => SessionState::Invalidated,
            SessionOutcome::Closed(_) | SessionOutcome::Rejected(_) => SessionState::Closed,
        };

        tracing::info!(
            client_id = %self.client_id,
            outcome = ?outcome,
            sequence = ?self.resume.sequence,
            "Session ended"
        );

        SessionReport {
            outcome,
            resume: self.resume,
            steady_for: self.ready_at.map(|at| at.elapsed()),
        }
    }
}
