//! Ports for collaborators outside the ledger core
//!
//! The core consumes two external services: an exchange-rate history store
//! and an audit sink. Each is modelled as a trait in the owning crate that
//! extends [`DomainPort`]; adapters implement the trait and report failures
//! through [`PortError`].
//!
//! ```text
//!   ledger_service ──▶ ExchangeRateProvider ──▶ rate history store
//!                 └──▶ AuditSink            ──▶ audit trail storage
//! ```

use std::fmt;
use thiserror::Error;

/// Failure reported by a port adapter
#[derive(Debug, Error)]
pub enum PortError {
    /// No record matches the lookup
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    /// The backing service did not answer
    #[error("{service} is unavailable")]
    ServiceUnavailable { service: String },

    /// The backing service answered but refused the write
    #[error("{service} rejected the write: {reason}")]
    Rejected { service: String, reason: String },
}

impl PortError {
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }
}

/// Supertrait of every port, so adapters can be shared across tasks
pub trait DomainPort: Send + Sync + 'static {}
