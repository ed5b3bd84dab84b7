//! Milk Ledger Service - daily milk balance reconciliation for the Mandıra dashboard.

pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

pub use error::LedgerError;
