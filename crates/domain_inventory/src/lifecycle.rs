//! Shipment lifecycle state machine
//!
//! ```text
//!   Active ──▶ Closing ──▶ Closed ──▶ Archived
//!     │                      ▲ │
//!     └──────────────────────┘ └──▶ Active (reopen)
//! ```
//!
//! `Archived` is terminal. Closing is soft: a closed shipment can be reopened.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::shipment::ShipmentTotals;

/// Lifecycle state of a shipment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentState {
    /// Accepting expenses, dispatches and losses
    Active,
    /// Winding down; still accepts dispatches
    Closing,
    /// Soft-closed; reversible
    Closed,
    /// Terminal
    Archived,
}

impl ShipmentState {
    /// True if the state machine permits moving to `target`
    pub fn can_transition_to(&self, target: ShipmentState) -> bool {
        use ShipmentState::*;
        matches!(
            (*self, target),
            (Active, Closing) |
            (Active, Closed) |
            (Closing, Closed) |
            (Closed, Active) |
            (Closed, Archived)
        )
    }

    /// True if dispatches may consume inventory
    pub fn accepts_dispatch(&self) -> bool {
        matches!(self, ShipmentState::Active | ShipmentState::Closing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ShipmentState::Archived)
    }
}

impl fmt::Display for ShipmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShipmentState::Active => "active",
            ShipmentState::Closing => "closing",
            ShipmentState::Closed => "closed",
            ShipmentState::Archived => "archived",
        };
        f.write_str(name)
    }
}

/// Why a transition happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonCode {
    FullySold,
    RemainingTooSmall,
    Manual,
    BusinessDecision,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReasonCode::FullySold => "fully-sold",
            ReasonCode::RemainingTooSmall => "remaining-too-small",
            ReasonCode::Manual => "manual",
            ReasonCode::BusinessDecision => "business-decision",
        };
        f.write_str(name)
    }
}

/// One recorded state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleTransition {
    pub from: ShipmentState,
    pub to: ShipmentState,
    pub reason: ReasonCode,
    pub actor: String,
    pub notes: Option<String>,
    pub at: DateTime<Utc>,
}

/// Thresholds for automatic closure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    /// Dispatched / total volume at or above which a shipment closes
    pub auto_close_threshold: Decimal,
    /// Remaining volume at or below which a shipment closes
    pub min_remaining_volume: Decimal,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            auto_close_threshold: dec!(1.0),
            min_remaining_volume: dec!(0.5),
        }
    }
}

impl LifecyclePolicy {
    /// Returns the auto-close reason the totals satisfy, if any
    ///
    /// Only shipments that have dispatched something qualify, so a shipment
    /// whose lots are all tiny is not closed at intake.
    pub fn auto_close_reason(&self, totals: &ShipmentTotals) -> Option<ReasonCode> {
        if totals.total_volume <= Decimal::ZERO || totals.dispatched_volume <= Decimal::ZERO {
            return None;
        }
        if totals.dispatched_volume / totals.total_volume >= self.auto_close_threshold {
            Some(ReasonCode::FullySold)
        } else if totals.remaining_volume <= self.min_remaining_volume {
            Some(ReasonCode::RemainingTooSmall)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ShipmentState::*;

    #[test]
    fn test_allowed_transitions() {
        assert!(Active.can_transition_to(Closing));
        assert!(Active.can_transition_to(Closed));
        assert!(Closing.can_transition_to(Closed));
        assert!(Closed.can_transition_to(Active));
        assert!(Closed.can_transition_to(Archived));
    }

    #[test]
    fn test_archived_is_terminal() {
        for target in [Active, Closing, Closed, Archived] {
            assert!(!Archived.can_transition_to(target));
        }
        assert!(!Active.can_transition_to(Archived));
        assert!(!Closing.can_transition_to(Active));
    }

    #[test]
    fn test_reason_code_serializes_kebab_case() {
        let json = serde_json::to_string(&ReasonCode::RemainingTooSmall).unwrap();
        assert_eq!(json, "\"remaining-too-small\"");
    }
}
