//! Fleet status report

use crate::client::ClientStatus;
use serde::Serialize;

/// Per-client statuses at one point in time, sorted by client id
#[derive(Debug, Clone, Default, Serialize)]
pub struct FleetReport {
    pub clients: Vec<(String, ClientStatus)>,
}

impl FleetReport {
    #[must_use]
    pub fn new(mut clients: Vec<(String, ClientStatus)>) -> Self {
        clients.sort_by(|a, b| a.0.cmp(&b.0));
        Self { clients }
    }

    /// Number of clients with the given status
    #[must_use]
    pub fn count(&self, status: ClientStatus) -> usize {
        self.clients.iter().filter(|(_, s)| *s == status).count()
    }

    /// Check if every client reached a terminal status
    #[must_use]
    pub fn all_terminal(&self) -> bool {
        self.clients.iter().all(|(_, s)| s.is_terminal())
    }
}

impl std::fmt::Display for FleetReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (id, status)) in self.clients.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id}={status}")?;
        }
        Ok(())
    }
}
