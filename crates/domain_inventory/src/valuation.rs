//! Lot Valuation Engine
//!
//! Derives a lot's investment, unit cost and profit figures from its inputs.
//! The derivation is a pure function: it reads the stored purchase
//! conversion, allocated expenses, volumes and revenue, and never performs
//! a rate lookup, so running it twice on the same lot yields identical
//! figures.
//!
//! Order of evaluation:
//!
//! 1. available = total − loss
//! 2. remaining = available − dispatched
//! 3. investment = purchase (in base) + allocated expenses
//! 4. unit cost = investment / total, or 0 for an empty lot
//! 5. dispatched fraction = dispatched / total
//! 6. realized profit = revenue − investment × dispatched fraction
//! 7. unrealized value = remaining × unit cost

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{round_volume, Currency, Money};

use crate::error::InventoryError;
use crate::lot::Lot;

/// Derived fields of a lot, all monetary values in base currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotFigures {
    pub available_volume: Decimal,
    pub remaining_volume: Decimal,
    pub investment: Money,
    pub unit_cost: Money,
    pub dispatched_fraction: Decimal,
    pub realized_profit: Money,
    pub unrealized_value: Money,
}

impl LotFigures {
    pub fn zero(currency: Currency) -> Self {
        Self {
            available_volume: Decimal::ZERO,
            remaining_volume: Decimal::ZERO,
            investment: Money::zero(currency),
            unit_cost: Money::zero(currency),
            dispatched_fraction: Decimal::ZERO,
            realized_profit: Money::zero(currency),
            unrealized_value: Money::zero(currency),
        }
    }

    /// Investment attributable to volume already dispatched
    pub fn cost_of_dispatched(&self) -> Money {
        self.investment.multiply(self.dispatched_fraction)
    }
}

/// Computes the derived figures of a lot
///
/// # Errors
///
/// Returns a money error if the allocated expenses or revenue are not in the
/// lot's base currency.
pub fn derive(lot: &Lot) -> Result<LotFigures, InventoryError> {
    let available_volume = round_volume(lot.total_volume - lot.loss_volume);
    let remaining_volume = round_volume(available_volume - lot.dispatched_volume);

    let investment = lot
        .purchase_conversion
        .amount()
        .checked_add(&lot.allocated_expenses)?;

    let (unit_cost, dispatched_fraction) = if lot.total_volume.is_zero() {
        (Money::zero(investment.currency()), Decimal::ZERO)
    } else {
        (
            investment.divide(lot.total_volume)?,
            lot.dispatched_volume / lot.total_volume,
        )
    };

    let realized_profit = lot
        .revenue
        .checked_sub(&investment.multiply(dispatched_fraction))?;
    let unrealized_value = unit_cost.multiply(remaining_volume);

    Ok(LotFigures {
        available_volume,
        remaining_volume,
        investment,
        unit_cost,
        dispatched_fraction,
        realized_profit,
        unrealized_value,
    })
}

/// Returns a copy of the lot with its derived fields recomputed
pub fn recompute(lot: &Lot) -> Result<Lot, InventoryError> {
    let mut updated = lot.clone();
    updated.figures = derive(lot)?;
    Ok(updated)
}
