//! Inventory Domain
//!
//! Physical goods arrive in shipments and are tracked in lots:
//!
//! - **Shipment aggregate**: lifecycle state machine and rollup of its lots
//! - **Lots**: volume conservation and derived valuation figures
//! - **Expense allocation**: splitting shared costs across sibling lots
//! - **Valuation engine**: pure recompute of investment, unit cost and profit
//! - **Loss/liability**: write-offs and the responsible-party settlement workflow
//!
//! All monetary figures derived here are in the base (reporting) currency.
//! Conversions happen before values reach this crate and arrive as
//! [`domain_fx::ValuationConversion`], so a degraded rate is recorded on the
//! lot it affected.

pub mod allocation;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod loss;
pub mod lot;
pub mod shipment;
pub mod valuation;

pub use allocation::{allocate, AllocationMethod, Expense, ExpenseAllocation, ALLOCATION_TOLERANCE};
pub use error::InventoryError;
pub use events::ShipmentEvent;
pub use lifecycle::{LifecyclePolicy, LifecycleTransition, ReasonCode, ShipmentState};
pub use loss::{Liability, LiabilityState, LiabilityTransition, LossRecord};
pub use lot::{DegradedValuation, Lot, NewLot, ValuationInput};
pub use shipment::{NewShipment, Route, Shipment, ShipmentTotals};
pub use valuation::LotFigures;
