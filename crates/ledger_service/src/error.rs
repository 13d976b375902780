//! Service error handling

use thiserror::Error;

use core_kernel::{CoreError, ErrorKind, MoneyError};
use domain_fx::FxError;
use domain_inventory::InventoryError;
use domain_ledger::LedgerError;
use domain_sales::SalesError;

/// Errors surfaced by [`crate::LedgerService`] operations
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The entity changed after the operation read it
    #[error("Concurrent modification of {entity} {id}; retry the operation")]
    Concurrency { entity: &'static str, id: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// An operation was attempted on a record it cannot apply to
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Fx(#[from] FxError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Sales(#[from] SalesError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Core(CoreError),

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Unauthorized(message) => ServiceError::Unauthorized(message),
            other => ServiceError::Core(other),
        }
    }
}

impl ServiceError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn concurrency(entity: &'static str, id: impl ToString) -> Self {
        ServiceError::Concurrency {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::NotFound { .. } => ErrorKind::NotFound,
            ServiceError::Concurrency { .. } => ErrorKind::Concurrency,
            ServiceError::Unauthorized(_) => ErrorKind::Authorization,
            ServiceError::Conflict(_) => ErrorKind::Consistency,
            ServiceError::Fx(e) => e.kind(),
            ServiceError::Inventory(e) => e.kind(),
            ServiceError::Sales(e) => e.kind(),
            ServiceError::Ledger(e) => e.kind(),
            ServiceError::Core(e) => e.kind(),
            ServiceError::Money(_) => ErrorKind::Validation,
        }
    }

    /// True only for optimistic-lock conflicts
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// True for an inventory shortfall, whichever domain reported it
    pub fn is_insufficient_inventory(&self) -> bool {
        match self {
            ServiceError::Sales(e) => e.is_insufficient_inventory(),
            ServiceError::Inventory(e) => matches!(e, InventoryError::InsufficientInventory { .. }),
            _ => false,
        }
    }
}
