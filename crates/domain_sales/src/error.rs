//! Sales domain errors

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{ErrorKind, MoneyError};
use domain_inventory::InventoryError;

/// Errors that can occur in the sales domain
#[derive(Debug, Error)]
pub enum SalesError {
    /// Unit price must be strictly positive
    #[error("Invalid unit price: {0}")]
    InvalidPrice(Decimal),

    /// Paid amount exceeds what is owed
    #[error("Over-payment: paid {paid} exceeds amount due {due}")]
    OverPayment { paid: Decimal, due: Decimal },

    /// Negative or zero payment
    #[error("Invalid payment amount: {0}")]
    InvalidPayment(Decimal),

    /// A volume that must be positive is not
    #[error("Invalid {field} volume: {value}")]
    NegativeVolume { field: String, value: Decimal },

    /// More volume reported lost in transit than was sent
    #[error("Transit loss {loss} exceeds sent volume {sent}")]
    TransitLossExceedsSent { sent: Decimal, loss: Decimal },

    /// Money movement in a currency other than the sale's
    #[error("Currency mismatch: sale is in {expected}, payment in {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),
}

impl SalesError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SalesError::InvalidPrice(_)
            | SalesError::OverPayment { .. }
            | SalesError::InvalidPayment(_)
            | SalesError::NegativeVolume { .. }
            | SalesError::TransitLossExceedsSent { .. }
            | SalesError::Money(_) => ErrorKind::Validation,
            SalesError::CurrencyMismatch { .. } => ErrorKind::Conversion,
            SalesError::Inventory(e) => e.kind(),
        }
    }

    /// True for an inventory shortfall on the target lot
    pub fn is_insufficient_inventory(&self) -> bool {
        matches!(self, SalesError::Inventory(InventoryError::InsufficientInventory { .. }))
    }
}
