//! Reconnect supervisor
//!
//! Runs sessions for one logical client back to back, resuming when the peer
//! allows it and backing off between failed attempts.

use super::transport::{self, OUTBOUND_BUFFER};
use super::{ClientStatus, Credentials, GatewayConfig};
use crate::dispatch::DispatchTable;
use crate::error::GatewayError;
use crate::protocol::CloseCode;
use crate::session::{CloseReason, GatewaySession, ResumeState, SessionOutcome, SessionReport};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Time the writer gets to close the socket before it is aborted
const WRITER_SHUTDOWN: Duration = Duration::from_secs(5);

/// Floor for the socket write timeout
const MIN_WRITE_TIMEOUT: Duration = Duration::from_millis(1);

/// Immediate reconnects allowed in a row before RECONNECT goes through backoff
const MAX_IMMEDIATE_RESUMES: u32 = 3;

/// A session ready for this long ends a run of immediate reconnects
const RESUME_STREAK_RESET: Duration = Duration::from_secs(60);

/// Why a client stopped for good
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientExit {
    /// Attempt budget spent
    Exhausted { attempts: u32 },
    /// Peer closed with a code that forbids reconnecting
    Rejected(CloseCode),
    /// Cancelled
    Stopped,
}

impl ClientExit {
    /// Status matching this exit
    #[must_use]
    pub const fn status(self) -> ClientStatus {
        match self {
            Self::Exhausted { .. } => ClientStatus::Exhausted,
            Self::Rejected(_) => ClientStatus::Rejected,
            Self::Stopped => ClientStatus::Stopped,
        }
    }
}

/// One logical gateway client
pub struct GatewayClient {
    config: Arc<GatewayConfig>,
    credentials: Arc<Credentials>,
    dispatch: Arc<DispatchTable>,
    client_id: Arc<str>,
    status: Arc<watch::Sender<ClientStatus>>,
}

impl GatewayClient {
    /// Create a client; nothing connects until [`GatewayClient::run`]
    #[must_use]
    pub fn new(
        config: Arc<GatewayConfig>,
        credentials: Credentials,
        dispatch: Arc<DispatchTable>,
    ) -> Self {
        let client_id = Arc::from(credentials.id());
        let (status, _) = watch::channel(ClientStatus::Pending);
        Self {
            config,
            credentials: Arc::new(credentials),
            dispatch,
            client_id,
            status: Arc::new(status),
        }
    }

    /// Client id (account id prefix of the token)
    #[must_use]
    pub fn id(&self) -> &str {
        &self.client_id
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> ClientStatus {
        *self.status.borrow()
    }

    /// Watch status changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ClientStatus> {
        self.status.subscribe()
    }

    /// Overwrite the status (used by the fleet when the task dies)
    pub(crate) fn set_status(&self, status: ClientStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            tracing::debug!(client_id = %self.client_id, from = %previous, to = %status, "Client status changed");
        }
    }

    /// Connect and reconnect until exhausted, rejected or cancelled
    pub async fn run(&self, cancel: CancellationToken) -> ClientExit {
        let mut backoff = self.config.backoff.start();
        let mut resume = ResumeState::default();
        let mut immediate_resumes = 0;

        tracing::info!(client_id = %self.client_id, "Client starting");

        let exit = loop {
            if cancel.is_cancelled() {
                break ClientExit::Stopped;
            }

            self.set_status(ClientStatus::Connecting);
            let (outcome, reached_ready) = match self.connect_and_run(&cancel, resume.clone()).await {
                Ok(report) => {
                    if let (Some(threshold), Some(steady)) =
                        (self.config.stable_reset_after, report.steady_for)
                    {
                        if steady >= threshold && backoff.attempts() > 0 {
                            tracing::info!(client_id = %self.client_id, "Session was stable, resetting attempts");
                            backoff.reset();
                        }
                    }
                    if report.steady_for.is_some_and(|steady| steady >= RESUME_STREAK_RESET) {
                        immediate_resumes = 0;
                    }
                    resume = report.resume;
                    (report.outcome, report.steady_for.is_some())
                }
                Err(e) => {
                    tracing::warn!(
                        client_id = %self.client_id,
                        error = %e,
                        transport = e.is_transport(),
                        "Connection failed"
                    );
                    (SessionOutcome::Closed(CloseReason::Transport(e.to_string())), false)
                }
            };

            if cancel.is_cancelled() {
                break ClientExit::Stopped;
            }

            match outcome {
                SessionOutcome::Resuming { .. }
                    if reached_ready && immediate_resumes < MAX_IMMEDIATE_RESUMES =>
                {
                    immediate_resumes += 1;
                    tracing::info!(client_id = %self.client_id, "Reconnecting to resume");
                    continue;
                }
                SessionOutcome::Resuming { .. } => {
                    tracing::warn!(
                        client_id = %self.client_id,
                        reached_ready,
                        immediate_resumes,
                        "Gateway keeps requesting reconnects, backing off"
                    );
                }
                SessionOutcome::Rejected(code) => break ClientExit::Rejected(code),
                SessionOutcome::Invalidated => resume.clear(),
                SessionOutcome::Closed(reason) => {
                    tracing::info!(client_id = %self.client_id, reason = %reason, "Connection closed");
                }
            }

            let Some(delay) = backoff.next_delay() else {
                break ClientExit::Exhausted {
                    attempts: backoff.attempts(),
                };
            };

            self.set_status(ClientStatus::BackingOff);
            tracing::info!(
                client_id = %self.client_id,
                attempt = backoff.attempts(),
                delay_ms = delay.as_millis() as u64,
                "Reconnecting after delay"
            );

            tokio::select! {
                () = cancel.cancelled() => break ClientExit::Stopped,
                () = tokio::time::sleep(delay) => {}
            }
        };

        match exit {
            ClientExit::Exhausted { attempts } => {
                tracing::error!(client_id = %self.client_id, attempts, "Reconnect attempts exhausted");
            }
            ClientExit::Rejected(code) => {
                tracing::error!(client_id = %self.client_id, code = %code, "Client rejected by gateway");
            }
            ClientExit::Stopped => tracing::info!(client_id = %self.client_id, "Client stopped"),
        }
        self.set_status(exit.status());
        exit
    }

    async fn connect_and_run(
        &self,
        cancel: &CancellationToken,
        resume: ResumeState,
    ) -> Result<SessionReport, GatewayError> {
        let stream = tokio::select! {
            () = cancel.cancelled() => {
                return Ok(SessionReport {
                    outcome: SessionOutcome::Closed(CloseReason::Cancelled),
                    resume,
                    steady_for: None,
                });
            }
            stream = transport::connect(&self.config) => stream?,
        };

        let (sink, source) = stream.split();
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let closed = cancel.child_token();
        let writer = transport::spawn_writer(
            sink,
            rx,
            self.config.heartbeat_margin.max(MIN_WRITE_TIMEOUT),
            closed.clone(),
            self.client_id.clone(),
        );

        let session = GatewaySession::new(
            self.config.clone(),
            self.credentials.clone(),
            self.dispatch.clone(),
            resume,
            tx,
            closed,
            self.status.clone(),
        );
        let report = session.run(source).await;

        transport::finish_writer(writer, WRITER_SHUTDOWN).await;
        Ok(report)
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("client_id", &self.client_id)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::BackoffPolicy;
    use crate::protocol::GatewayMessage;
    use futures::SinkExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    /// Local gateway answering every handshake with RECONNECT
    async fn reconnecting_gateway(send_ready: bool) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let connections = Arc::new(AtomicUsize::new(0));
        let accepted = connections.clone();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    let text = |m: GatewayMessage| Message::Text(m.to_json().unwrap());
                    if ws.send(text(GatewayMessage::hello(41_250))).await.is_err() {
                        return;
                    }
                    // IDENTIFY or RESUME
                    if ws.next().await.is_none() {
                        return;
                    }
                    if send_ready {
                        let ready = GatewayMessage::dispatch("READY", 1, json!({"session_id": "abc"}));
                        ws.send(text(ready)).await.ok();
                    }
                    ws.send(text(GatewayMessage::reconnect())).await.ok();
                    while let Some(Ok(_)) = ws.next().await {}
                });
            }
        });

        (url, connections)
    }

    fn client(url: &str, max_attempts: u32) -> GatewayClient {
        let config = GatewayConfig::default()
            .with_url(url)
            .with_backoff(BackoffPolicy {
                base: Duration::from_millis(10),
                max: Duration::from_millis(40),
                jitter: Duration::from_millis(5),
                max_attempts,
            });
        GatewayClient::new(
            Arc::new(config),
            Credentials::new("123456789012345678.token"),
            Arc::new(DispatchTable::empty()),
        )
    }

    #[tokio::test]
    async fn test_unreachable_gateway_exhausts() {
        let client = client("ws://127.0.0.1:1", 3);
        assert_eq!(client.status(), ClientStatus::Pending);

        let exit = client.run(CancellationToken::new()).await;
        assert_eq!(exit, ClientExit::Exhausted { attempts: 3 });
        assert_eq!(client.status(), ClientStatus::Exhausted);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let client = client("ws://127.0.0.1:1", 3);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(client.run(cancel).await, ClientExit::Stopped);
        assert_eq!(client.status(), ClientStatus::Stopped);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let config = GatewayConfig::default()
            .with_url("ws://127.0.0.1:1")
            .with_backoff(BackoffPolicy {
                base: Duration::from_secs(3_600),
                max: Duration::from_secs(3_600),
                jitter: Duration::ZERO,
                max_attempts: 5,
            });
        let client = Arc::new(GatewayClient::new(
            Arc::new(config),
            Credentials::new("123456789012345678.token"),
            Arc::new(DispatchTable::empty()),
        ));
        let cancel = CancellationToken::new();
        let mut status = client.subscribe();

        let task = tokio::spawn({
            let client = client.clone();
            let cancel = cancel.clone();
            async move { client.run(cancel).await }
        });

        status.wait_for(|s| *s == ClientStatus::BackingOff).await.unwrap();
        cancel.cancel();
        assert_eq!(task.await.unwrap(), ClientExit::Stopped);
    }

    #[tokio::test]
    async fn test_reconnect_before_ready_consumes_attempts() {
        let (url, connections) = reconnecting_gateway(false).await;
        let client = client(&url, 2);

        let exit = tokio::time::timeout(Duration::from_secs(10), client.run(CancellationToken::new()))
            .await
            .expect("client kept reconnecting");
        assert_eq!(exit, ClientExit::Exhausted { attempts: 2 });
        assert_eq!(connections.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_immediate_resumes_are_capped() {
        let (url, connections) = reconnecting_gateway(true).await;
        let client = client(&url, 2);

        let exit = tokio::time::timeout(Duration::from_secs(10), client.run(CancellationToken::new()))
            .await
            .expect("client kept reconnecting");
        assert_eq!(exit, ClientExit::Exhausted { attempts: 2 });
        // the capped run of immediate resumes, then one connection per attempt
        assert_eq!(
            connections.load(Ordering::SeqCst),
            MAX_IMMEDIATE_RESUMES as usize + 2
        );
    }

    #[test]
    fn test_exit_status() {
        assert_eq!(ClientExit::Stopped.status(), ClientStatus::Stopped);
        assert_eq!(
            ClientExit::Rejected(CloseCode::AuthenticationFailed).status(),
            ClientStatus::Rejected
        );
    }
}
