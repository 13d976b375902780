//! Shipment Aggregate
//!
//! A shipment owns its lifecycle state and a rollup of its lots. Lots refer
//! to their shipment by id; the shipment never holds lot references, so the
//! rollup is always rebuilt from the lots rather than incrementally patched.
//!
//! # Invariants
//!
//! - `totals.dispatched_volume` equals the sum of live lot dispatched volumes
//!   after every [`Shipment::apply_rollup`]
//! - Dispatch is only accepted while `Active` or `Closing`
//! - `Archived` shipments accept no mutation at all

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use core_kernel::{round_volume, Actor, Currency, Money, ShipmentId};

use crate::error::InventoryError;
use crate::events::ShipmentEvent;
use crate::lifecycle::{LifecyclePolicy, LifecycleTransition, ReasonCode, ShipmentState};
use crate::lot::Lot;

/// Origin and destination of a shipment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub origin: String,
    pub destination: String,
}

/// Rolled-up figures for all live lots of a shipment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentTotals {
    pub reporting_currency: Currency,
    pub lot_count: usize,
    pub total_volume: Decimal,
    pub loss_volume: Decimal,
    pub available_volume: Decimal,
    pub dispatched_volume: Decimal,
    pub remaining_volume: Decimal,
    /// Purchase totals in the currencies lots were bought in
    pub purchases_by_currency: BTreeMap<Currency, Money>,
    pub cost: Money,
    pub revenue: Money,
    pub realized_profit: Money,
    pub unrealized_value: Money,
    pub degraded_lots: usize,
}

impl ShipmentTotals {
    pub fn empty(reporting_currency: Currency) -> Self {
        Self {
            reporting_currency,
            lot_count: 0,
            total_volume: Decimal::ZERO,
            loss_volume: Decimal::ZERO,
            available_volume: Decimal::ZERO,
            dispatched_volume: Decimal::ZERO,
            remaining_volume: Decimal::ZERO,
            purchases_by_currency: BTreeMap::new(),
            cost: Money::zero(reporting_currency),
            revenue: Money::zero(reporting_currency),
            realized_profit: Money::zero(reporting_currency),
            unrealized_value: Money::zero(reporting_currency),
            degraded_lots: 0,
        }
    }

    /// Rebuilds totals from the lots of one shipment
    ///
    /// Deleted lots are skipped. Lot figures are already in base currency,
    /// so the reporting currency must match the lots' base currency.
    pub fn rollup<'a>(
        reporting_currency: Currency,
        lots: impl IntoIterator<Item = &'a Lot>,
    ) -> Result<Self, InventoryError> {
        let mut totals = Self::empty(reporting_currency);

        for lot in lots.into_iter().filter(|l| !l.is_deleted) {
            totals.lot_count += 1;
            totals.total_volume += lot.total_volume;
            totals.loss_volume += lot.loss_volume;
            totals.available_volume += lot.figures.available_volume;
            totals.dispatched_volume += lot.dispatched_volume;
            totals.remaining_volume += lot.figures.remaining_volume;

            let purchase = totals
                .purchases_by_currency
                .entry(lot.purchase_amount.currency())
                .or_insert_with(|| Money::zero(lot.purchase_amount.currency()));
            *purchase = purchase.checked_add(&lot.purchase_amount)?;

            totals.cost = totals.cost.checked_add(&lot.figures.investment)?;
            totals.revenue = totals.revenue.checked_add(&lot.revenue)?;
            totals.realized_profit = totals.realized_profit.checked_add(&lot.figures.realized_profit)?;
            totals.unrealized_value = totals.unrealized_value.checked_add(&lot.figures.unrealized_value)?;
            if lot.is_degraded() {
                totals.degraded_lots += 1;
            }
        }

        totals.total_volume = round_volume(totals.total_volume);
        totals.loss_volume = round_volume(totals.loss_volume);
        totals.available_volume = round_volume(totals.available_volume);
        totals.dispatched_volume = round_volume(totals.dispatched_volume);
        totals.remaining_volume = round_volume(totals.remaining_volume);
        Ok(totals)
    }
}

/// Input for creating a shipment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewShipment {
    /// Business reference, e.g. wagon number
    pub code: String,
    pub intake_date: NaiveDate,
    pub route: Route,
}

/// One batch of incoming goods
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub code: String,
    pub intake_date: NaiveDate,
    pub route: Route,
    pub state: ShipmentState,
    pub totals: ShipmentTotals,
    /// Volume lost on the way to clients, from sale events
    pub transit_loss_volume: Decimal,
    pub transitions: Vec<LifecycleTransition>,
    pub version: u64,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<ShipmentEvent>,
}

impl Shipment {
    /// Creates an active shipment with no lots
    pub fn new(input: NewShipment, reporting_currency: Currency) -> Result<Self, InventoryError> {
        if input.code.trim().is_empty() {
            return Err(InventoryError::validation("shipment code is required"));
        }
        let now = Utc::now();
        let id = ShipmentId::new();
        Ok(Self {
            id,
            code: input.code.clone(),
            intake_date: input.intake_date,
            route: input.route,
            state: ShipmentState::Active,
            totals: ShipmentTotals::empty(reporting_currency),
            transit_loss_volume: Decimal::ZERO,
            transitions: Vec::new(),
            version: 1,
            is_deleted: false,
            created_at: now,
            updated_at: now,
            events: vec![ShipmentEvent::Created {
                shipment_id: id,
                code: input.code,
                timestamp: now,
            }],
        })
    }

    /// Returns accumulated domain events and clears them
    pub fn take_events(&mut self) -> Vec<ShipmentEvent> {
        std::mem::take(&mut self.events)
    }

    /// Replaces the rollup with one rebuilt from the lots
    pub fn apply_rollup<'a>(&mut self, lots: impl IntoIterator<Item = &'a Lot>) -> Result<(), InventoryError> {
        self.totals = ShipmentTotals::rollup(self.totals.reporting_currency, lots)?;
        self.touch();
        Ok(())
    }

    /// Adds transit loss reported on a sale
    pub fn add_transit_loss(&mut self, volume: Decimal) {
        if volume > Decimal::ZERO {
            self.transit_loss_volume = round_volume(self.transit_loss_volume + volume);
            self.touch();
        }
    }

    /// Fails unless the shipment may have lots added or expenses allocated
    pub fn ensure_mutable(&self, operation: &str) -> Result<(), InventoryError> {
        if self.is_deleted || self.state.is_terminal() {
            return Err(self.not_open(operation));
        }
        Ok(())
    }

    /// Fails unless the shipment accepts dispatches
    pub fn ensure_dispatchable(&self) -> Result<(), InventoryError> {
        if self.is_deleted || !self.state.accepts_dispatch() {
            return Err(self.not_open("dispatch"));
        }
        Ok(())
    }

    /// Active → Closing
    pub fn begin_closing(&mut self, actor: &Actor, notes: Option<String>) -> Result<(), InventoryError> {
        self.transition(ShipmentState::Closing, ReasonCode::Manual, actor, notes)
    }

    /// Manual closure, allowed from any state that is not already closed or archived
    pub fn close(&mut self, reason: ReasonCode, actor: &Actor, notes: Option<String>) -> Result<(), InventoryError> {
        self.transition(ShipmentState::Closed, reason, actor, notes)
    }

    /// Closed → Active
    pub fn reopen(&mut self, reason: ReasonCode, actor: &Actor, notes: Option<String>) -> Result<(), InventoryError> {
        self.transition(ShipmentState::Active, reason, actor, notes)
    }

    /// Closed → Archived
    pub fn archive(&mut self, actor: &Actor, notes: Option<String>) -> Result<(), InventoryError> {
        self.transition(ShipmentState::Archived, ReasonCode::BusinessDecision, actor, notes)
    }

    /// Closes the shipment if the current totals meet an auto-close guard
    ///
    /// Returns the reason when a transition was made.
    pub fn evaluate_auto_close(&mut self, policy: &LifecyclePolicy) -> Result<Option<ReasonCode>, InventoryError> {
        if !self.state.accepts_dispatch() {
            return Ok(None);
        }
        match policy.auto_close_reason(&self.totals) {
            Some(reason) => {
                info!(shipment_id = %self.id, reason = ?reason, "Auto-closing shipment");
                self.transition(ShipmentState::Closed, reason, &Actor::system(), None)?;
                Ok(Some(reason))
            }
            None => Ok(None),
        }
    }

    fn transition(
        &mut self,
        target: ShipmentState,
        reason: ReasonCode,
        actor: &Actor,
        notes: Option<String>,
    ) -> Result<(), InventoryError> {
        if self.is_deleted || !self.state.can_transition_to(target) {
            debug!(shipment_id = %self.id, from = %self.state, to = %target, "Rejected lifecycle transition");
            return Err(InventoryError::InvalidTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            });
        }

        let record = LifecycleTransition {
            from: self.state,
            to: target,
            reason,
            actor: actor.id.clone(),
            notes,
            at: Utc::now(),
        };
        info!(
            shipment_id = %self.id,
            from = %record.from,
            to = %record.to,
            actor = %record.actor,
            "Shipment state changed"
        );
        self.state = target;
        self.transitions.push(record.clone());
        self.events.push(ShipmentEvent::StateChanged {
            shipment_id: self.id,
            transition: record,
        });
        self.touch();
        Ok(())
    }

    fn not_open(&self, operation: &str) -> InventoryError {
        InventoryError::ShipmentNotOpen {
            shipment_id: self.id,
            state: self.state.to_string(),
            operation: operation.to_string(),
        }
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}
