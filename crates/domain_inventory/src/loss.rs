//! Loss/Liability Tracker
//!
//! A loss record writes volume off a lot. When a responsible party is named,
//! a liability is opened against them:
//!
//! ```text
//!   Reported ──▶ Acknowledged ──▶ Resolved | Paid | Waived
//! ```
//!
//! | Transition | Roles |
//! |---|---|
//! | acknowledge, resolve | Manager, Admin |
//! | mark paid | Accountant, Admin |
//! | waive | Admin |
//! | adjust percentage | Manager, Admin |

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{round_volume, Actor, LiabilityId, LossId, LotId, Money, Rate, Role, ShipmentId};

use crate::error::InventoryError;
use crate::lot::Lot;

/// A write-off of damaged or lost volume
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LossRecord {
    pub id: LossId,
    pub lot_id: LotId,
    pub shipment_id: ShipmentId,
    pub volume: Decimal,
    pub reason: String,
    pub responsible_party: Option<String>,
    /// Volume × the lot's unit cost at the time of the loss, in base currency
    pub estimated_value: Money,
    pub liability_id: Option<LiabilityId>,
    pub recorded_by: String,
    pub is_deleted: bool,
    pub recorded_at: DateTime<Utc>,
}

impl LossRecord {
    /// Creates a loss record valued at the lot's current unit cost
    ///
    /// The lot itself is not mutated; callers apply the volume with
    /// [`Lot::record_loss`].
    pub fn new(
        lot: &Lot,
        volume: Decimal,
        reason: impl Into<String>,
        responsible_party: Option<String>,
        actor: &Actor,
    ) -> Result<Self, InventoryError> {
        let volume = round_volume(volume);
        if volume <= Decimal::ZERO {
            return Err(InventoryError::negative_volume("loss", volume));
        }
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(InventoryError::validation("loss reason is required"));
        }

        Ok(Self {
            id: LossId::new(),
            lot_id: lot.id,
            shipment_id: lot.shipment_id,
            volume,
            reason,
            responsible_party: responsible_party.filter(|p| !p.trim().is_empty()),
            estimated_value: lot.figures.unit_cost.multiply(volume),
            liability_id: None,
            recorded_by: actor.id.clone(),
            is_deleted: false,
            recorded_at: Utc::now(),
        })
    }

    /// Opens a liability if a responsible party was named
    pub fn open_liability(&mut self) -> Option<Liability> {
        let party = self.responsible_party.clone()?;
        let liability = Liability::new(self.id, party, self.estimated_value);
        self.liability_id = Some(liability.id);
        Some(liability)
    }
}

/// Settlement state of a liability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiabilityState {
    Reported,
    Acknowledged,
    Resolved,
    Paid,
    Waived,
}

impl LiabilityState {
    pub fn can_transition_to(&self, target: LiabilityState) -> bool {
        use LiabilityState::*;
        matches!(
            (*self, target),
            (Reported, Acknowledged) |
            (Acknowledged, Resolved) |
            (Acknowledged, Paid) |
            (Acknowledged, Waived)
        )
    }

    /// Amount may still be adjusted
    pub fn is_open(&self) -> bool {
        matches!(self, LiabilityState::Reported | LiabilityState::Acknowledged)
    }
}

impl fmt::Display for LiabilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LiabilityState::Reported => "reported",
            LiabilityState::Acknowledged => "acknowledged",
            LiabilityState::Resolved => "resolved",
            LiabilityState::Paid => "paid",
            LiabilityState::Waived => "waived",
        };
        f.write_str(name)
    }
}

/// Recorded change of a liability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiabilityTransition {
    pub from: LiabilityState,
    pub to: LiabilityState,
    pub actor: String,
    pub notes: Option<String>,
    pub at: DateTime<Utc>,
}

/// A responsible party's obligation arising from a loss
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Liability {
    pub id: LiabilityId,
    pub loss_id: LossId,
    pub responsible_party: String,
    pub estimated_value: Money,
    pub percentage: Rate,
    pub amount: Money,
    pub state: LiabilityState,
    pub history: Vec<LiabilityTransition>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Liability {
    /// Opens a liability at 100% of the estimated value
    pub fn new(loss_id: LossId, responsible_party: String, estimated_value: Money) -> Self {
        let now = Utc::now();
        Self {
            id: LiabilityId::new(),
            loss_id,
            responsible_party,
            estimated_value,
            percentage: Rate::full(),
            amount: estimated_value,
            state: LiabilityState::Reported,
            history: Vec::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn acknowledge(&mut self, actor: &Actor, notes: Option<String>) -> Result<(), InventoryError> {
        actor.require_any(&[Role::Manager, Role::Admin], "acknowledge liability")?;
        self.transition(LiabilityState::Acknowledged, actor, notes)
    }

    pub fn resolve(&mut self, actor: &Actor, notes: Option<String>) -> Result<(), InventoryError> {
        actor.require_any(&[Role::Manager, Role::Admin], "resolve liability")?;
        self.transition(LiabilityState::Resolved, actor, notes)
    }

    pub fn mark_paid(&mut self, actor: &Actor, notes: Option<String>) -> Result<(), InventoryError> {
        actor.require_any(&[Role::Accountant, Role::Admin], "mark liability paid")?;
        self.transition(LiabilityState::Paid, actor, notes)
    }

    pub fn waive(&mut self, actor: &Actor, notes: Option<String>) -> Result<(), InventoryError> {
        actor.require_any(&[Role::Admin], "waive liability")?;
        self.transition(LiabilityState::Waived, actor, notes)
    }

    /// Sets the share of the estimated value the party is liable for
    pub fn adjust_percentage(&mut self, percentage: Decimal, actor: &Actor) -> Result<(), InventoryError> {
        actor.require_any(&[Role::Manager, Role::Admin], "adjust liability percentage")?;
        if !self.state.is_open() {
            return Err(InventoryError::InvalidTransition {
                from: self.state.to_string(),
                to: "adjusted".to_string(),
            });
        }
        if percentage < Decimal::ZERO || percentage > Decimal::ONE_HUNDRED {
            return Err(InventoryError::validation(format!(
                "liability percentage must be within 0-100, got {}",
                percentage
            )));
        }
        self.percentage = Rate::from_percentage(percentage);
        self.amount = self.percentage.apply(&self.estimated_value);
        self.touch();
        Ok(())
    }

    fn transition(&mut self, target: LiabilityState, actor: &Actor, notes: Option<String>) -> Result<(), InventoryError> {
        if !self.state.can_transition_to(target) {
            return Err(InventoryError::InvalidTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            });
        }
        self.history.push(LiabilityTransition {
            from: self.state,
            to: target,
            actor: actor.id.clone(),
            notes,
            at: Utc::now(),
        });
        self.state = target;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}
