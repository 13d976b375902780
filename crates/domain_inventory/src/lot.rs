//! Lots: the unit of cost and profit tracking

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{round_volume, Currency, ExpenseId, LotId, Money, MoneyError, SaleId, ShipmentId};
use domain_fx::ValuationConversion;

use crate::allocation::ExpenseAllocation;
use crate::error::InventoryError;
use crate::valuation::{self, LotFigures};

/// Input for creating a lot at intake
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLot {
    pub name: String,
    /// Physical piece count
    pub quantity: u32,
    /// Volume in m³
    pub total_volume: Decimal,
    /// Purchase price in the single currency fixed at intake
    pub purchase_amount: Money,
}

/// Valuation input whose conversion fell back to a last-resort rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "input", content = "id", rename_all = "snake_case")]
pub enum ValuationInput {
    Purchase,
    Expense(ExpenseId),
    Sale(SaleId),
}

/// Marker recorded on a lot whose figures rest on a degraded conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedValuation {
    pub input: ValuationInput,
    pub fallback_rate: Decimal,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

/// A homogeneous sub-quantity of goods within one shipment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    pub id: LotId,
    pub shipment_id: ShipmentId,
    pub name: String,
    pub quantity: u32,
    pub total_volume: Decimal,
    pub loss_volume: Decimal,
    pub dispatched_volume: Decimal,
    pub purchase_amount: Money,
    /// Purchase amount in base currency, resolved at intake
    pub purchase_conversion: ValuationConversion,
    /// Base-currency sum of live expense allocations
    pub allocated_expenses: Money,
    /// Base-currency revenue from accepted dispatches
    pub revenue: Money,
    pub figures: LotFigures,
    pub degraded: Vec<DegradedValuation>,
    pub version: u64,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lot {
    /// Creates a lot and computes its initial figures
    ///
    /// # Errors
    ///
    /// Fails when the volume or purchase amount is negative, or when the
    /// conversion's currency disagrees with itself.
    pub fn new(
        shipment_id: ShipmentId,
        input: NewLot,
        purchase_conversion: ValuationConversion,
    ) -> Result<Self, InventoryError> {
        if input.total_volume < Decimal::ZERO {
            return Err(InventoryError::negative_volume("total", input.total_volume));
        }
        if input.purchase_amount.is_negative() {
            return Err(InventoryError::validation("purchase amount must not be negative"));
        }
        if input.name.trim().is_empty() {
            return Err(InventoryError::validation("lot name is required"));
        }

        let base = purchase_conversion.amount().currency();
        let now = Utc::now();
        let mut lot = Self {
            id: LotId::new(),
            shipment_id,
            name: input.name,
            quantity: input.quantity,
            total_volume: round_volume(input.total_volume),
            loss_volume: Decimal::ZERO,
            dispatched_volume: Decimal::ZERO,
            purchase_amount: input.purchase_amount,
            purchase_conversion: purchase_conversion.clone(),
            allocated_expenses: Money::zero(base),
            revenue: Money::zero(base),
            figures: LotFigures::zero(base),
            degraded: Vec::new(),
            version: 1,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        lot.note_conversion(ValuationInput::Purchase, &purchase_conversion);
        lot.recompute()?;
        Ok(lot)
    }

    /// Currency all derived figures are expressed in
    pub fn base_currency(&self) -> Currency {
        self.purchase_conversion.amount().currency()
    }

    pub fn available_volume(&self) -> Decimal {
        self.figures.available_volume
    }

    pub fn remaining_volume(&self) -> Decimal {
        self.figures.remaining_volume
    }

    /// True if any valuation input used a fallback rate
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    /// Overwrites the derived figures from the current inputs
    pub fn recompute(&mut self) -> Result<(), InventoryError> {
        self.figures = valuation::derive(self)?;
        Ok(())
    }

    /// Records a degraded conversion against this lot; no-op for converted values
    pub fn note_conversion(&mut self, input: ValuationInput, conversion: &ValuationConversion) {
        if let ValuationConversion::Degraded { fallback_rate, reason, .. } = conversion {
            self.degraded.retain(|d| d.input != input);
            self.degraded.push(DegradedValuation {
                input,
                fallback_rate: *fallback_rate,
                reason: reason.clone(),
                recorded_at: Utc::now(),
            });
        }
    }

    /// Replaces the purchase conversion, clearing the degraded marker if the
    /// new conversion used a real rate
    pub fn revalue_purchase(&mut self, conversion: ValuationConversion) -> Result<(), InventoryError> {
        self.ensure_live()?;
        if conversion.amount().currency() != self.base_currency() {
            return Err(MoneyError::CurrencyMismatch(
                self.base_currency().to_string(),
                conversion.amount().currency().to_string(),
            )
            .into());
        }
        self.degraded.retain(|d| d.input != ValuationInput::Purchase);
        self.note_conversion(ValuationInput::Purchase, &conversion);
        self.purchase_conversion = conversion;
        self.touch();
        self.recompute()
    }

    /// Adds an allocated share of an expense
    pub fn apply_allocation(&mut self, allocation: &ExpenseAllocation) -> Result<(), InventoryError> {
        self.ensure_live()?;
        self.allocated_expenses = self.allocated_expenses.checked_add(&allocation.amount)?;
        self.touch();
        self.recompute()
    }

    /// Removes a previously applied allocation
    pub fn reverse_allocation(&mut self, allocation: &ExpenseAllocation) -> Result<(), InventoryError> {
        self.allocated_expenses = self.allocated_expenses.checked_sub(&allocation.amount)?;
        self.degraded
            .retain(|d| d.input != ValuationInput::Expense(allocation.expense_id));
        self.touch();
        self.recompute()
    }

    /// Consumes accepted volume and books its revenue
    ///
    /// # Errors
    ///
    /// `InsufficientInventory` if the accepted volume exceeds the remaining volume.
    pub fn record_dispatch(&mut self, accepted_volume: Decimal, revenue: Money) -> Result<(), InventoryError> {
        self.ensure_live()?;
        let accepted = round_volume(accepted_volume);
        if accepted < Decimal::ZERO {
            return Err(InventoryError::negative_volume("accepted", accepted));
        }
        if accepted > self.remaining_volume() {
            return Err(InventoryError::InsufficientInventory {
                lot_id: self.id,
                requested: accepted,
                remaining: self.remaining_volume(),
            });
        }
        self.revenue = self.revenue.checked_add(&revenue)?;
        self.dispatched_volume = round_volume(self.dispatched_volume + accepted);
        self.touch();
        self.recompute()
    }

    /// Writes off damaged or lost volume
    pub fn record_loss(&mut self, volume: Decimal) -> Result<(), InventoryError> {
        self.ensure_live()?;
        let volume = round_volume(volume);
        if volume <= Decimal::ZERO {
            return Err(InventoryError::negative_volume("loss", volume));
        }
        if volume > self.remaining_volume() {
            return Err(InventoryError::LossExceedsRemaining {
                lot_id: self.id,
                requested: volume,
                remaining: self.remaining_volume(),
            });
        }
        self.loss_volume = round_volume(self.loss_volume + volume);
        self.touch();
        self.recompute()
    }

    /// Verifies the volume conservation rules
    pub fn check_invariants(&self) -> Result<(), InventoryError> {
        if self.loss_volume > self.total_volume {
            return Err(InventoryError::validation(format!(
                "lot {} loss volume {} exceeds total {}",
                self.id, self.loss_volume, self.total_volume
            )));
        }
        if self.dispatched_volume > self.total_volume - self.loss_volume {
            return Err(InventoryError::validation(format!(
                "lot {} dispatched volume {} exceeds available {}",
                self.id,
                self.dispatched_volume,
                self.total_volume - self.loss_volume
            )));
        }
        Ok(())
    }

    pub fn soft_delete(&mut self) {
        self.is_deleted = true;
        self.touch();
    }

    fn ensure_live(&self) -> Result<(), InventoryError> {
        if self.is_deleted {
            return Err(InventoryError::Deleted {
                entity: "Lot".to_string(),
                id: self.id.to_string(),
            });
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}
