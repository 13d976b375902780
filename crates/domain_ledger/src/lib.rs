//! Ledger Domain
//!
//! - **Cash ledger**: append-only journal of debt creation, payments,
//!   expenses and opening balances; the source of truth for balances
//! - **Client debt ledger**: per-client, per-currency issued/paid totals,
//!   updated by applying ledger entries
//! - **Reconciliation**: replays the journal and reports clients whose stored
//!   totals have drifted

pub mod client;
pub mod entry;
pub mod error;
pub mod ledger;
pub mod reconcile;

pub use client::{Client, CurrencyBalance};
pub use entry::{EntryKind, LedgerEntry, LedgerEntryBuilder};
pub use error::LedgerError;
pub use ledger::CashLedger;
pub use reconcile::{reconcile_clients, BalanceDivergence};
