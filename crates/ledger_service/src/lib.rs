//! Ledger Service
//!
//! The application layer of the shipment ledger. It owns the transactional
//! store and exposes every operation collaborators call:
//!
//! - **Shipments and lots**: intake, lifecycle transitions, revaluation
//! - **Expenses**: recording, allocation across lots, supersession, deletion
//! - **Sales and payments**: the atomic dispatch transaction and later payments
//! - **Losses**: write-offs and the liability workflow
//! - **Clients and ledger**: opening balances, reversals, balance queries
//! - **Reconciliation**: rebuilds every derived figure and reports drift
//!
//! Configuration comes from `LEDGER_*` environment variables; logging goes
//! through `tracing`.

pub mod audit;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod service;
pub mod store;
pub mod summary;
pub mod telemetry;

pub use audit::TracingAuditSink;
pub use config::ServiceConfig;
pub use error::ServiceError;
pub use reconcile::{reconcile_state, Divergence, ReconciliationReport};
pub use service::LedgerService;
pub use store::{LedgerState, UnitOfWork};
pub use summary::{
    ClientBalanceView, Completed, CurrencyBalanceView, LossOutcome, LotSummary, ShipmentSummary, Warning,
};
pub use telemetry::init_tracing;
