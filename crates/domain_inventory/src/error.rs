//! Inventory domain errors

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{CoreError, ErrorKind, ExpenseId, LotId, MoneyError, ShipmentId};

/// Errors that can occur in the inventory domain
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Accepted volume exceeds what is left on the lot
    #[error("Insufficient inventory on lot {lot_id}: requested {requested}, remaining {remaining}")]
    InsufficientInventory {
        lot_id: LotId,
        requested: Decimal,
        remaining: Decimal,
    },

    /// A volume that must be positive (or non-negative) is not
    #[error("Invalid {field} volume: {value}")]
    NegativeVolume { field: String, value: Decimal },

    /// Recorded loss would exceed the lot's undispatched volume
    #[error("Loss of {requested} on lot {lot_id} exceeds remaining volume {remaining}")]
    LossExceedsRemaining {
        lot_id: LotId,
        requested: Decimal,
        remaining: Decimal,
    },

    /// Generic input validation failure
    #[error("Validation error: {0}")]
    Validation(String),

    /// Allocation percentages or amounts do not reconcile with the expense
    #[error("Allocation mismatch for expense {expense_id}: {detail}")]
    AllocationMismatch { expense_id: ExpenseId, detail: String },

    /// Expense already has live allocations
    #[error("Expense {expense_id} is already allocated; supersede the prior allocation instead")]
    AlreadyAllocated { expense_id: ExpenseId },

    /// A target lot belongs to another shipment
    #[error("Lot {lot_id} does not belong to shipment {shipment_id}")]
    LotNotInShipment { lot_id: LotId, shipment_id: ShipmentId },

    /// Lifecycle state machine rejected the transition
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The shipment's state forbids the operation
    #[error("Shipment {shipment_id} is {state}; {operation} is not permitted")]
    ShipmentNotOpen {
        shipment_id: ShipmentId,
        state: String,
        operation: String,
    },

    /// The entity was soft-deleted
    #[error("{entity} {id} has been deleted")]
    Deleted { entity: String, id: String },

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl InventoryError {
    pub fn validation(message: impl Into<String>) -> Self {
        InventoryError::Validation(message.into())
    }

    pub fn negative_volume(field: impl Into<String>, value: Decimal) -> Self {
        InventoryError::NegativeVolume {
            field: field.into(),
            value,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            InventoryError::InsufficientInventory { .. }
            | InventoryError::NegativeVolume { .. }
            | InventoryError::LossExceedsRemaining { .. }
            | InventoryError::Validation(_)
            | InventoryError::Money(_) => ErrorKind::Validation,
            InventoryError::AllocationMismatch { .. }
            | InventoryError::AlreadyAllocated { .. }
            | InventoryError::LotNotInShipment { .. } => ErrorKind::Consistency,
            InventoryError::InvalidTransition { .. } | InventoryError::ShipmentNotOpen { .. } => {
                ErrorKind::Lifecycle
            }
            InventoryError::Deleted { .. } => ErrorKind::NotFound,
            InventoryError::Core(e) => e.kind(),
        }
    }
}
