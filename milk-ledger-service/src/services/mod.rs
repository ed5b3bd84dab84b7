//! Services module for milk-ledger-service.

pub mod database;
pub mod ledger;
pub mod metrics;
pub mod reconciliation;
pub mod store;

pub use database::Database;
pub use ledger::MilkLedger;
pub use metrics::{get_metrics, init_metrics};
pub use store::{LedgerStore, MemoryLedgerStore};
