//! Strongly-typed identifiers for domain entities
//!
//! Newtype wrappers around UUIDs so a lot id can never be passed where a
//! shipment or client id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Ids are UUIDv7 and sort by creation time
macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(raw)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

// Inventory identifiers
define_id!(ShipmentId, "SHP");
define_id!(LotId, "LOT");
define_id!(ExpenseId, "EXP");
define_id!(AllocationId, "ALC");
define_id!(LossId, "LSS");
define_id!(LiabilityId, "LIA");

// Sales and ledger identifiers
define_id!(SaleId, "SAL");
define_id!(ClientId, "CLI");
define_id!(LedgerEntryId, "CSH");

// Currency identifiers
define_id!(RateId, "FX");

// Generic identifiers
define_id!(AuditEventId, "AUD");
