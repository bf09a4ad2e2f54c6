//! Test fixtures and data generators
//!
//! Provides tokens, configs and handler tables for integration tests.

use relay_gateway::client::BackoffPolicy;
use relay_gateway::{DispatchEvent, DispatchTable, GatewayConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Counter for unique test data
static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Get a unique suffix for test data
pub fn unique_suffix() -> u64 {
    COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// A token whose 18-char id prefix is unique within the test run
pub fn unique_token() -> String {
    format!("{:018}.mock.token", 100_000_000_000_000_000 + unique_suffix())
}

/// Client config pointed at `url` with fast backoff
pub fn test_config(url: &str, max_attempts: u32) -> GatewayConfig {
    GatewayConfig {
        handshake_timeout: Duration::from_secs(5),
        heartbeat_margin: Duration::from_millis(100),
        ..GatewayConfig::default()
    }
    .with_url(url)
    .with_backoff(BackoffPolicy {
        base: Duration::from_millis(10),
        max: Duration::from_millis(50),
        jitter: Duration::from_millis(5),
        max_attempts,
    })
}

/// Dispatch table forwarding every `event` to the returned channel
pub fn recording_table(event: &str) -> (DispatchTable, mpsc::UnboundedReceiver<DispatchEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let table = DispatchTable::builder()
        .on(event, move |ev: DispatchEvent| {
            let tx = tx.clone();
            async move {
                tx.send(ev).ok();
                Ok(())
            }
        })
        .build();
    (table, rx)
}
