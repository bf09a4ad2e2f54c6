//! Fleet supervisor
//!
//! Owns every logical client of the process, keyed by client id, and runs
//! each one on its own task.

use super::FleetReport;
use crate::client::{ClientStatus, Credentials, GatewayClient, GatewayConfig};
use crate::dispatch::DispatchTable;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct FleetEntry {
    client: Arc<GatewayClient>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Runs many independent gateway clients
pub struct FleetSupervisor {
    clients: DashMap<String, FleetEntry>,
    cancel: CancellationToken,
}

impl FleetSupervisor {
    /// Register one client per token
    ///
    /// Tokens sharing an id prefix get `-2`, `-3`, ... suffixes.
    pub fn new(
        config: GatewayConfig,
        dispatch: DispatchTable,
        tokens: impl IntoIterator<Item = String>,
    ) -> Self {
        let config = Arc::new(config);
        let dispatch = Arc::new(dispatch);
        let clients = DashMap::new();

        for token in tokens {
            let credentials = Credentials::new(token);
            let id = unique_id(&clients, credentials.id());
            if id != credentials.id() {
                tracing::warn!(client_id = %id, "Duplicate client id, added suffix");
            }

            let client = GatewayClient::new(config.clone(), credentials, dispatch.clone());
            clients.insert(
                id,
                FleetEntry {
                    client: Arc::new(client),
                    task: Mutex::new(None),
                },
            );
        }

        tracing::info!(clients = clients.len(), "Fleet created");

        Self {
            clients,
            cancel: CancellationToken::new(),
        }
    }

    /// Spawn every client that is not running yet
    pub fn start_all(&self) {
        let mut started = 0;
        for entry in &self.clients {
            let mut task = entry.task.lock();
            if task.is_some() {
                continue;
            }

            let client = entry.client.clone();
            let cancel = self.cancel.child_token();
            *task = Some(tokio::spawn(async move {
                let run = AssertUnwindSafe(client.run(cancel)).catch_unwind().await;
                if run.is_err() {
                    tracing::error!(client_id = %client.id(), "Client task panicked");
                    client.set_status(ClientStatus::Failed);
                }
            }));
            started += 1;
        }

        tracing::info!(started, "Fleet started");
    }

    /// Wait until every started client has stopped
    ///
    /// Cancel-safe: dropping the future leaves the clients running.
    pub async fn join(&self) -> FleetReport {
        let mut watchers: Vec<_> = self
            .clients
            .iter()
            .filter(|entry| entry.task.lock().is_some())
            .map(|entry| entry.client.subscribe())
            .collect();

        for status in &mut watchers {
            // a closed channel means the client is gone, which is as good as stopped
            status.wait_for(|s| s.is_terminal()).await.ok();
        }

        self.report()
    }

    /// Ask every client to stop at its next checkpoint
    pub fn shutdown(&self) {
        tracing::info!("Fleet shutting down");
        self.cancel.cancel();
    }

    /// Status of one client
    #[must_use]
    pub fn status(&self, id: &str) -> Option<ClientStatus> {
        self.clients.get(id).map(|entry| entry.client.status())
    }

    /// Status of every client, sorted by id
    #[must_use]
    pub fn statuses(&self) -> Vec<(String, ClientStatus)> {
        let mut statuses: Vec<_> = self
            .clients
            .iter()
            .map(|entry| (entry.key().clone(), entry.client.status()))
            .collect();
        statuses.sort_by(|a, b| a.0.cmp(&b.0));
        statuses
    }

    /// Client ids, sorted
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.clients.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Number of clients between start and a terminal status
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.count(ClientStatus::is_running)
    }

    /// Number of clients that spent their attempt budget
    #[must_use]
    pub fn exhausted_count(&self) -> usize {
        self.count(|s| s == ClientStatus::Exhausted)
    }

    /// Number of clients
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Check if the fleet has no clients
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Snapshot of every client's status
    #[must_use]
    pub fn report(&self) -> FleetReport {
        FleetReport::new(self.statuses())
    }

    fn count(&self, predicate: impl Fn(ClientStatus) -> bool) -> usize {
        self.clients
            .iter()
            .filter(|entry| predicate(entry.client.status()))
            .count()
    }
}

impl Drop for FleetSupervisor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn unique_id(clients: &DashMap<String, FleetEntry>, base: &str) -> String {
    if !clients.contains_key(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|id| !clients.contains_key(id))
        .unwrap_or_else(|| base.to_string())
}
