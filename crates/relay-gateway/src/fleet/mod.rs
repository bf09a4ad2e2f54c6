//! Fleet management
//!
//! Runs many independent clients in one process.

mod report;
mod supervisor;

pub use report::FleetReport;
pub use supervisor::FleetSupervisor;
