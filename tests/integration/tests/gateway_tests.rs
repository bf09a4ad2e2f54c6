//! Gateway Integration Tests
//!
//! Drive real clients over real WebSocket connections against the in-process
//! mock gateway. No external services are needed.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use integration_tests::{
    eventually, recording_table, refused_addr, test_config, unique_token, MockGateway, MockOptions,
};
use relay_common::{BackoffSettings, GatewaySettings};
use relay_gateway::protocol::{CloseCode, OpCode};
use relay_gateway::{
    ClientExit, ClientStatus, Credentials, DispatchTable, FleetSupervisor, GatewayClient,
    GatewayConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(10);

fn spawn_client(
    config: GatewayConfig,
    token: &str,
    dispatch: DispatchTable,
) -> (Arc<GatewayClient>, CancellationToken, JoinHandle<ClientExit>) {
    let client = Arc::new(GatewayClient::new(
        Arc::new(config),
        Credentials::new(token),
        Arc::new(dispatch),
    ));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let client = client.clone();
        let cancel = cancel.clone();
        async move { client.run(cancel).await }
    });
    (client, cancel, handle)
}

async fn wait_for_status(client: &GatewayClient, status: ClientStatus) {
    let mut rx = client.subscribe();
    tokio::time::timeout(WAIT, rx.wait_for(|s| *s == status))
        .await
        .expect("timed out waiting for status")
        .expect("status channel closed");
}

// ============================================================================
// Handshake Tests
// ============================================================================

#[tokio::test]
async fn test_identify_ready_presence() {
    let gateway = MockGateway::start().await.unwrap();
    let token = unique_token();
    let (table, mut readies) = recording_table("READY");
    let (client, cancel, handle) = spawn_client(test_config(&gateway.url(), 3), &token, table);

    wait_for_status(&client, ClientStatus::Ready).await;

    let ready = tokio::time::timeout(WAIT, readies.recv()).await.unwrap().unwrap();
    assert_eq!(ready.data["session_id"], "sess-1");
    assert_eq!(ready.sequence, Some(1));
    assert_eq!(&*ready.client_id, client.id());

    assert!(eventually(WAIT, || !gateway.frames_with_op(OpCode::PresenceUpdate).is_empty()).await);
    let identify = &gateway.frames_with_op(OpCode::Identify)[0];
    assert_eq!(identify.d["token"], token.as_str());
    assert_eq!(identify.d["compress"], false);
    assert_eq!(identify.d["properties"]["os"], "Linux");

    cancel.cancel();
    assert_eq!(handle.await.unwrap(), ClientExit::Stopped);
    assert_eq!(client.status(), ClientStatus::Stopped);
}

#[tokio::test]
async fn test_compressed_stream() {
    let gateway = MockGateway::start_with(MockOptions {
        compress: true,
        ..MockOptions::default()
    })
    .await
    .unwrap();
    let (table, mut readies) = recording_table("READY");
    let (client, cancel, handle) = spawn_client(test_config(&gateway.url(), 3), &unique_token(), table);

    wait_for_status(&client, ClientStatus::Ready).await;
    let ready = tokio::time::timeout(WAIT, readies.recv()).await.unwrap().unwrap();
    assert_eq!(ready.data["session_id"], "sess-1");
    assert_eq!(ready.data["user"]["username"], "mock");
    assert!(!gateway.frames_with_op(OpCode::Identify).is_empty());

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_heartbeats_carry_sequence_and_get_acked() {
    let gateway = MockGateway::start_with(MockOptions {
        heartbeat_interval_ms: 300,
        ..MockOptions::default()
    })
    .await
    .unwrap();
    let (client, cancel, handle) =
        spawn_client(test_config(&gateway.url(), 3), &unique_token(), DispatchTable::empty());

    wait_for_status(&client, ClientStatus::Ready).await;
    assert!(eventually(WAIT, || gateway.frames_with_op(OpCode::Heartbeat).len() >= 3).await);

    for heartbeat in gateway.frames_with_op(OpCode::Heartbeat) {
        assert_eq!(heartbeat.d, 1);
    }
    // acks keep the connection alive, so no reconnect happened
    assert_eq!(gateway.connections(), 1);
    assert_eq!(client.status(), ClientStatus::Ready);

    cancel.cancel();
    handle.await.unwrap();
}

// ============================================================================
// Reconnect Tests
// ============================================================================

#[tokio::test]
async fn test_reconnect_resumes_session() {
    let gateway = MockGateway::start_with(MockOptions {
        reconnect_after_first_ready: true,
        ..MockOptions::default()
    })
    .await
    .unwrap();
    let token = unique_token();
    let (client, cancel, handle) =
        spawn_client(test_config(&gateway.url(), 3), &token, DispatchTable::empty());

    assert!(eventually(WAIT, || !gateway.frames_with_op(OpCode::Resume).is_empty()).await);

    let resume = &gateway.frames_with_op(OpCode::Resume)[0];
    assert_eq!(resume.connection, 2);
    assert_eq!(resume.d["session_id"], "sess-1");
    assert_eq!(resume.d["seq"], 1);
    assert_eq!(resume.d["token"], token.as_str());
    assert_eq!(gateway.frames_with_op(OpCode::Identify).len(), 1);

    wait_for_status(&client, ClientStatus::Ready).await;
    cancel.cancel();
    assert_eq!(handle.await.unwrap(), ClientExit::Stopped);
}

#[tokio::test]
async fn test_invalidated_session_identifies_again() {
    let gateway = MockGateway::start_with(MockOptions {
        invalidate_first: true,
        ..MockOptions::default()
    })
    .await
    .unwrap();
    let (client, cancel, handle) =
        spawn_client(test_config(&gateway.url(), 3), &unique_token(), DispatchTable::empty());

    wait_for_status(&client, ClientStatus::Ready).await;

    let identifies = gateway.frames_with_op(OpCode::Identify);
    assert_eq!(identifies.len(), 2);
    assert_eq!(identifies[0].connection, 1);
    assert_eq!(identifies[1].connection, 2);
    assert!(gateway.frames_with_op(OpCode::Resume).is_empty());

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_exactly_max_attempts() {
    let token = unique_token();
    let gateway = MockGateway::start_with(MockOptions {
        reject_tokens: [token.clone()].into(),
        reject_code: 4000,
        ..MockOptions::default()
    })
    .await
    .unwrap();
    let (client, _cancel, handle) =
        spawn_client(test_config(&gateway.url(), 4), &token, DispatchTable::empty());

    let exit = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    assert_eq!(exit, ClientExit::Exhausted { attempts: 4 });
    assert_eq!(gateway.connections(), 4);
    assert_eq!(client.status(), ClientStatus::Exhausted);
}

#[tokio::test]
async fn test_reconnect_without_ready_is_bounded() {
    let gateway = MockGateway::start_with(MockOptions {
        reconnect_before_ready: true,
        ..MockOptions::default()
    })
    .await
    .unwrap();
    let (client, _cancel, handle) =
        spawn_client(test_config(&gateway.url(), 3), &unique_token(), DispatchTable::empty());

    let exit = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    assert_eq!(exit, ClientExit::Exhausted { attempts: 3 });
    assert_eq!(gateway.connections(), 3);
    assert_eq!(gateway.frames_with_op(OpCode::Identify).len(), 3);
    assert!(gateway.frames_with_op(OpCode::Resume).is_empty());
    assert_eq!(client.status(), ClientStatus::Exhausted);
}

#[tokio::test]
async fn test_authentication_failure_stops_immediately() {
    let token = unique_token();
    let gateway = MockGateway::start_with(MockOptions {
        reject_tokens: [token.clone()].into(),
        reject_code: 4004,
        ..MockOptions::default()
    })
    .await
    .unwrap();
    let (client, _cancel, handle) =
        spawn_client(test_config(&gateway.url(), 5), &token, DispatchTable::empty());

    let exit = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    assert_eq!(exit, ClientExit::Rejected(CloseCode::AuthenticationFailed));
    assert_eq!(gateway.connections(), 1);
    assert_eq!(client.status(), ClientStatus::Rejected);
}

#[tokio::test]
async fn test_refused_connection_exhausts() {
    let addr = refused_addr().await.unwrap();
    let config = test_config(&format!("ws://{addr}"), 3);
    let (client, _cancel, handle) = spawn_client(config, &unique_token(), DispatchTable::empty());

    let exit = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    assert_eq!(exit, ClientExit::Exhausted { attempts: 3 });
    assert_eq!(client.status(), ClientStatus::Exhausted);
}

// ============================================================================
// Fleet Tests
// ============================================================================

#[tokio::test]
async fn test_fleet_of_five_with_one_bad_token() {
    let tokens: Vec<String> = (0..5).map(|_| unique_token()).collect();
    let bad = tokens[2].clone();
    let bad_id: String = bad.chars().take(18).collect();

    let gateway = MockGateway::start_with(MockOptions {
        reject_tokens: [bad].into(),
        ..MockOptions::default()
    })
    .await
    .unwrap();

    let fleet = FleetSupervisor::new(test_config(&gateway.url(), 3), DispatchTable::empty(), tokens);
    fleet.start_all();

    assert!(
        eventually(WAIT, || {
            fleet.exhausted_count() == 1
                && fleet
                    .statuses()
                    .iter()
                    .filter(|(_, s)| *s == ClientStatus::Ready)
                    .count()
                    == 4
        })
        .await,
        "fleet statuses: {:?}",
        fleet.statuses()
    );
    assert_eq!(fleet.status(&bad_id), Some(ClientStatus::Exhausted));
    assert_eq!(fleet.running_count(), 4);

    fleet.shutdown();
    let report = tokio::time::timeout(WAIT, fleet.join()).await.unwrap();
    assert_eq!(report.count(ClientStatus::Stopped), 4);
    assert_eq!(report.count(ClientStatus::Exhausted), 1);
    assert!(report.all_terminal());
}

#[tokio::test]
async fn test_fleet_from_loaded_settings() {
    let gateway = MockGateway::start().await.unwrap();
    let settings = GatewaySettings {
        url: gateway.url(),
        ..GatewaySettings::default()
    };
    let backoff = BackoffSettings {
        max_reconnects: 2,
        base_ms: 10,
        max_ms: 20,
        jitter_ms: 0,
        ..BackoffSettings::default()
    };

    let fleet = FleetSupervisor::new(
        GatewayConfig::from_settings(&settings, &backoff),
        DispatchTable::empty(),
        vec![unique_token(), unique_token()],
    );
    fleet.start_all();
    assert!(eventually(WAIT, || gateway.readies() == 2).await);

    fleet.shutdown();
    let report = tokio::time::timeout(WAIT, fleet.join()).await.unwrap();
    assert_eq!(report.count(ClientStatus::Stopped), 2);
}
