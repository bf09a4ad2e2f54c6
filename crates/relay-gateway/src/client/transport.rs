//! WebSocket transport
//!
//! Opens connections and runs the writer half of a socket.

use super::GatewayConfig;
use crate::error::GatewayError;
use crate::protocol::GatewayMessage;
use futures_util::{Sink, SinkExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

/// A connected gateway socket
pub type GatewayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Channel buffer size for outgoing messages
pub const OUTBOUND_BUFFER: usize = 64;

/// A message queued for the writer
///
/// Carries an optional receipt that fires with the time the frame was written
/// to the socket. The receipt is dropped unsent when the write fails.
#[derive(Debug)]
pub struct Outbound {
    message: GatewayMessage,
    written: Option<oneshot::Sender<Instant>>,
}

impl Outbound {
    /// Queue a message without waiting for the write
    #[must_use]
    pub fn new(message: GatewayMessage) -> Self {
        Self {
            message,
            written: None,
        }
    }

    /// Queue a message and get a receiver for its write time
    #[must_use]
    pub fn with_receipt(message: GatewayMessage) -> (Self, oneshot::Receiver<Instant>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                message,
                written: Some(tx),
            },
            rx,
        )
    }

    /// Split into the message and its receipt sender
    #[must_use]
    pub fn into_parts(self) -> (GatewayMessage, Option<oneshot::Sender<Instant>>) {
        (self.message, self.written)
    }
}

impl From<GatewayMessage> for Outbound {
    fn from(message: GatewayMessage) -> Self {
        Self::new(message)
    }
}

/// Open a WebSocket connection to the configured endpoint
///
/// The whole TCP/TLS/upgrade handshake is bounded by the handshake timeout.
pub async fn connect(config: &GatewayConfig) -> Result<GatewayStream, GatewayError> {
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_frame_bytes);
    ws_config.max_frame_size = Some(config.max_frame_bytes);

    let connecting = connect_async_with_config(config.url.as_str(), Some(ws_config), false);
    let (stream, response) = tokio::time::timeout(config.handshake_timeout, connecting)
        .await
        .map_err(|_| GatewayError::ConnectTimeout(config.handshake_timeout))??;

    tracing::debug!(status = %response.status(), "WebSocket connection established");
    Ok(stream)
}

/// Spawn the task that owns the socket's write half
///
/// Drains `outbound` as JSON text frames and closes the socket once the
/// channel closes. A write that fails or takes longer than `write_timeout`
/// stops the writer and cancels `closed`.
pub fn spawn_writer<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Outbound>,
    write_timeout: Duration,
    closed: CancellationToken,
    client_id: Arc<str>,
) -> JoinHandle<()>
where
    S: Sink<Message, Error = WsError> + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut failed = false;

        while let Some(frame) = outbound.recv().await {
            let (message, written) = frame.into_parts();
            let json = match message.to_json() {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(client_id = %client_id, error = %e, "Failed to encode message");
                    continue;
                }
            };

            match tokio::time::timeout(write_timeout, sink.send(Message::Text(json))).await {
                Ok(Ok(())) => {
                    if let Some(written) = written {
                        written.send(Instant::now()).ok();
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(client_id = %client_id, error = %e, "Failed to send message to WebSocket");
                    failed = true;
                    break;
                }
                Err(_) => {
                    tracing::warn!(
                        client_id = %client_id,
                        timeout_ms = write_timeout.as_millis() as u64,
                        "WebSocket write timed out"
                    );
                    failed = true;
                    break;
                }
            }
        }

        // senders see the channel closed before the session is told
        drop(outbound);
        if failed {
            closed.cancel();
        }

        sink.close().await.ok();
        tracing::debug!(client_id = %client_id, "Writer stopped");
    })
}

/// Wait for a writer to close its socket, aborting it after `grace`
pub async fn finish_writer(mut writer: JoinHandle<()>, grace: Duration) {
    if tokio::time::timeout(grace, &mut writer).await.is_err() {
        tracing::debug!("Writer did not stop in time, aborting");
        writer.abort();
    }
}
