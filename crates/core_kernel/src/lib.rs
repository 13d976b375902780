//! Core Kernel - Foundational types for the shipment ledger
//!
//! This crate provides the building blocks shared by every domain crate:
//! - Money types with precise decimal arithmetic
//! - Strongly-typed identifiers
//! - The actor (identity context) passed into mutating calls
//! - The error taxonomy and the port traits for external collaborators

pub mod money;
pub mod identifiers;
pub mod actor;
pub mod audit;
pub mod ports;
pub mod error;

pub use money::{Money, Currency, MoneyError, Rate};
pub use identifiers::{
    ShipmentId, LotId, ExpenseId, AllocationId, LossId, LiabilityId,
    SaleId, ClientId, LedgerEntryId, RateId, AuditEventId,
};
pub use actor::{Actor, Role};
pub use audit::{AuditRecord, AuditSink};
pub use ports::{PortError, DomainPort};
pub use error::{CoreError, ErrorKind};

/// Volumes are tracked to the litre (0.001 m³)
pub const VOLUME_PRECISION: u32 = 3;

/// Rounds a volume to [`VOLUME_PRECISION`]
pub fn round_volume(value: rust_decimal::Decimal) -> rust_decimal::Decimal {
    value.round_dp(VOLUME_PRECISION)
}
