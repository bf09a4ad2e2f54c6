//! Test helpers for integration tests
//!
//! Provides an in-process mock gateway speaking the server side of the
//! protocol, a zlib-stream encoder, and polling helpers.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use flate2::{Compress, Compression, FlushCompress};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use relay_gateway::protocol::{GatewayMessage, OpCode};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

/// Compresses messages as one continuous zlib stream, sync-flushing each
pub struct ZlibStreamEncoder {
    compress: Compress,
}

impl ZlibStreamEncoder {
    pub fn new() -> Self {
        Self {
            compress: Compress::new(Compression::default(), true),
        }
    }

    /// Compress one message; the output ends with `00 00 FF FF`
    pub fn encode(&mut self, text: &str) -> Vec<u8> {
        let mut input = text.as_bytes();
        let mut out = Vec::with_capacity(text.len() + 64);
        loop {
            let before = self.compress.total_in();
            self.compress
                .compress_vec(input, &mut out, FlushCompress::Sync)
                .expect("compression failed");
            input = &input[(self.compress.total_in() - before) as usize..];
            if input.is_empty() && out.len() < out.capacity() {
                return out;
            }
            out.reserve(1024);
        }
    }
}

impl Default for ZlibStreamEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Mock gateway behaviour
#[derive(Debug, Clone)]
pub struct MockOptions {
    /// Interval announced in HELLO
    pub heartbeat_interval_ms: u64,
    /// Send binary zlib-stream frames instead of text
    pub compress: bool,
    /// Tokens answered with a close frame after IDENTIFY
    pub reject_tokens: HashSet<String>,
    /// Close code used for rejected tokens
    pub reject_code: u16,
    /// Send RECONNECT right after the first READY
    pub reconnect_after_first_ready: bool,
    /// Answer the first IDENTIFY with INVALID_SESSION
    pub invalidate_first: bool,
    /// Answer every IDENTIFY with RECONNECT instead of READY
    pub reconnect_before_ready: bool,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 45_000,
            compress: false,
            reject_tokens: HashSet::new(),
            reject_code: 4000,
            reconnect_after_first_ready: false,
            invalidate_first: false,
            reconnect_before_ready: false,
        }
    }
}

/// A frame the client sent to the mock
#[derive(Debug, Clone)]
pub struct ClientFrame {
    /// 1-based connection index
    pub connection: usize,
    pub op: Option<u8>,
    pub d: Value,
}

#[derive(Default)]
struct Recorded {
    frames: Mutex<Vec<ClientFrame>>,
    connections: AtomicUsize,
    readies: AtomicUsize,
}

/// In-process gateway accepting any number of connections
pub struct MockGateway {
    pub addr: SocketAddr,
    recorded: Arc<Recorded>,
    _handle: JoinHandle<()>,
}

impl MockGateway {
    /// Start a mock gateway with default behaviour
    pub async fn start() -> Result<Self> {
        Self::start_with(MockOptions::default()).await
    }

    /// Start a mock gateway with custom behaviour
    pub async fn start_with(options: MockOptions) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;
        let recorded = Arc::new(Recorded::default());
        let options = Arc::new(options);

        let accept_recorded = recorded.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let recorded = accept_recorded.clone();
                let options = options.clone();
                tokio::spawn(async move {
                    serve_connection(stream, recorded, options).await.ok();
                });
            }
        });

        Ok(Self {
            addr,
            recorded,
            _handle: handle,
        })
    }

    /// WebSocket URL of the mock
    pub fn url(&self) -> String {
        format!("ws://{}/?encoding=json&v=9&compress=zlib-stream", self.addr)
    }

    /// Connections accepted so far
    pub fn connections(&self) -> usize {
        self.recorded.connections.load(Ordering::SeqCst)
    }

    /// READY dispatches sent so far
    pub fn readies(&self) -> usize {
        self.recorded.readies.load(Ordering::SeqCst)
    }

    /// Every frame received from clients
    pub fn frames(&self) -> Vec<ClientFrame> {
        self.recorded.frames.lock().clone()
    }

    /// Frames with the given op code
    pub fn frames_with_op(&self, op: OpCode) -> Vec<ClientFrame> {
        self.frames()
            .into_iter()
            .filter(|f| f.op == Some(op.as_u8()))
            .collect()
    }
}

struct MockConnection {
    socket: WebSocketStream<TcpStream>,
    encoder: Option<ZlibStreamEncoder>,
    sequence: u64,
}

impl MockConnection {
    async fn send(&mut self, message: &GatewayMessage) -> Result<()> {
        let text = message.to_json()?;
        let frame = match &mut self.encoder {
            Some(encoder) => Message::Binary(encoder.encode(&text)),
            None => Message::Text(text),
        };
        self.socket.send(frame).await?;
        Ok(())
    }

    async fn dispatch(&mut self, event: &str, data: Value) -> Result<()> {
        self.sequence += 1;
        let message = GatewayMessage::dispatch(event, self.sequence, data);
        self.send(&message).await
    }

    async fn close(&mut self, code: u16) -> Result<()> {
        self.socket
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: "mock close".into(),
            })))
            .await?;
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    recorded: Arc<Recorded>,
    options: Arc<MockOptions>,
) -> Result<()> {
    let socket = accept_async(stream).await?;
    let connection = recorded.connections.fetch_add(1, Ordering::SeqCst) + 1;
    let mut conn = MockConnection {
        socket,
        encoder: options.compress.then(ZlibStreamEncoder::new),
        sequence: 0,
    };

    conn.send(&GatewayMessage::hello(options.heartbeat_interval_ms)).await?;

    while let Some(frame) = conn.socket.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let message = GatewayMessage::from_json(&text)?;
        recorded.frames.lock().push(ClientFrame {
            connection,
            op: message.op,
            d: message.d.clone(),
        });

        match message.opcode() {
            Some(OpCode::Heartbeat) => conn.send(&GatewayMessage::heartbeat_ack()).await?,
            Some(OpCode::Identify) => {
                let token = message.d["token"].as_str().unwrap_or_default().to_string();
                if options.reject_tokens.contains(&token) {
                    conn.close(options.reject_code).await?;
                    break;
                }
                if options.invalidate_first && connection == 1 {
                    conn.send(&GatewayMessage::invalid_session(false)).await?;
                    continue;
                }
                if options.reconnect_before_ready {
                    conn.send(&GatewayMessage::reconnect()).await?;
                    continue;
                }

                let user_id: String = token.chars().take(18).collect();
                conn.dispatch(
                    "READY",
                    json!({
                        "session_id": format!("sess-{connection}"),
                        "user": {"id": user_id, "username": "mock", "discriminator": "0"},
                        "guilds": [],
                    }),
                )
                .await?;
                let readies = recorded.readies.fetch_add(1, Ordering::SeqCst) + 1;

                if options.reconnect_after_first_ready && readies == 1 {
                    conn.send(&GatewayMessage::reconnect()).await?;
                }
            }
            Some(OpCode::Resume) => {
                conn.sequence = message.d["seq"].as_u64().unwrap_or_default();
                conn.dispatch("RESUMED", json!({})).await?;
            }
            _ => {}
        }
    }

    Ok(())
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A local address nothing listens on
pub async fn refused_addr() -> Result<SocketAddr> {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}
