//! Expense Allocation Engine
//!
//! Distributes a shared expense across sibling lots of one shipment. The
//! engine only computes allocations; applying them to lots and guarding
//! against double allocation is done by the caller through
//! [`ensure_not_allocated`] and [`Lot::apply_allocation`](crate::lot::Lot::apply_allocation).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use core_kernel::{AllocationId, ExpenseId, LotId, Money, ShipmentId};
use domain_fx::ValuationConversion;

use crate::error::InventoryError;
use crate::lot::Lot;

/// Tolerance for percentage and amount reconciliation
pub const ALLOCATION_TOLERANCE: Decimal = dec!(0.01);

/// How an expense is split between lots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    /// Share proportional to lot volume
    #[default]
    VolumeBased,
    /// Share proportional to base-currency purchase value
    ValueBased,
    /// Same share for every lot
    EqualSplit,
}

impl fmt::Display for AllocationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AllocationMethod::VolumeBased => "volume_based",
            AllocationMethod::ValueBased => "value_based",
            AllocationMethod::EqualSplit => "equal_split",
        };
        f.write_str(name)
    }
}

impl AllocationMethod {
    fn weight(&self, lot: &Lot) -> Decimal {
        match self {
            AllocationMethod::VolumeBased => lot.total_volume,
            AllocationMethod::ValueBased => lot.purchase_conversion.amount().amount(),
            AllocationMethod::EqualSplit => Decimal::ONE,
        }
    }
}

/// A shared cost incurred for a shipment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub shipment_id: ShipmentId,
    pub description: String,
    /// Amount in the currency it was paid in
    pub amount: Money,
    pub expense_date: NaiveDate,
    /// Amount in base currency at the expense date
    pub base_conversion: ValuationConversion,
    pub recorded_by: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    /// Creates an expense record
    ///
    /// # Errors
    ///
    /// Fails unless the amount is strictly positive and a description is given.
    pub fn new(
        shipment_id: ShipmentId,
        description: impl Into<String>,
        amount: Money,
        expense_date: NaiveDate,
        base_conversion: ValuationConversion,
        recorded_by: impl Into<String>,
    ) -> Result<Self, InventoryError> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(InventoryError::validation("expense description is required"));
        }
        if !amount.is_positive() {
            return Err(InventoryError::validation(format!(
                "expense amount must be positive, got {}",
                amount
            )));
        }
        Ok(Self {
            id: ExpenseId::new(),
            shipment_id,
            description,
            amount,
            expense_date,
            base_conversion,
            recorded_by: recorded_by.into(),
            is_deleted: false,
            created_at: Utc::now(),
        })
    }

    pub fn base_amount(&self) -> Money {
        self.base_conversion.amount()
    }

    /// Flags the expense deleted; its ledger entry stays in the journal
    pub fn soft_delete(&mut self) -> Result<(), InventoryError> {
        if self.is_deleted {
            return Err(InventoryError::Deleted {
                entity: "Expense".to_string(),
                id: self.id.to_string(),
            });
        }
        self.is_deleted = true;
        Ok(())
    }
}

/// One lot's share of one expense
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseAllocation {
    pub id: AllocationId,
    pub expense_id: ExpenseId,
    pub lot_id: LotId,
    /// Share in percent (0-100)
    pub percentage: Decimal,
    /// Share in base currency
    pub amount: Money,
    pub method: AllocationMethod,
    /// Set when a later allocation of the same expense replaced this one
    pub superseded: bool,
    pub created_at: DateTime<Utc>,
}

/// Splits an expense amount across the target lots
///
/// Every lot but the last gets its proportional share rounded to the
/// currency's precision; the last absorbs the remainder of both the
/// percentage and the amount.
///
/// # Errors
///
/// - `Validation` for an empty target list, duplicate lots, deleted lots,
///   or a zero allocation basis
/// - `LotNotInShipment` if lots span more than one shipment
/// - `AllocationMismatch` if the result does not reconcile with the expense
pub fn allocate(
    expense_id: ExpenseId,
    amount: Money,
    lots: &[&Lot],
    method: AllocationMethod,
) -> Result<Vec<ExpenseAllocation>, InventoryError> {
    let first = lots
        .first()
        .ok_or_else(|| InventoryError::validation("an allocation needs at least one target lot"))?;

    let mut seen = HashSet::with_capacity(lots.len());
    for lot in lots {
        if !seen.insert(lot.id) {
            return Err(InventoryError::validation(format!("lot {} targeted twice", lot.id)));
        }
        if lot.is_deleted {
            return Err(InventoryError::Deleted {
                entity: "Lot".to_string(),
                id: lot.id.to_string(),
            });
        }
        if lot.shipment_id != first.shipment_id {
            return Err(InventoryError::LotNotInShipment {
                lot_id: lot.id,
                shipment_id: first.shipment_id,
            });
        }
    }

    let weights: Vec<Decimal> = lots.iter().map(|lot| method.weight(lot)).collect();
    let total_weight: Decimal = weights.iter().sum();
    if total_weight <= Decimal::ZERO {
        return Err(InventoryError::validation(format!(
            "{} allocation has no basis: total weight is {}",
            method, total_weight
        )));
    }

    let amounts = amount.allocate_by_ratios(&weights)?;

    let mut percentages = Vec::with_capacity(weights.len());
    let mut assigned = Decimal::ZERO;
    for (i, weight) in weights.iter().enumerate() {
        if i == weights.len() - 1 {
            percentages.push(dec!(100) - assigned);
        } else {
            let pct = (*weight / total_weight * dec!(100)).round_dp(4);
            assigned += pct;
            percentages.push(pct);
        }
    }

    let now = Utc::now();
    let allocations: Vec<ExpenseAllocation> = lots
        .iter()
        .zip(percentages)
        .zip(amounts)
        .map(|((lot, percentage), amount)| ExpenseAllocation {
            id: AllocationId::new(),
            expense_id,
            lot_id: lot.id,
            percentage,
            amount,
            method,
            superseded: false,
            created_at: now,
        })
        .collect();

    verify(expense_id, &amount, &allocations)?;
    Ok(allocations)
}

/// Checks that live allocations sum to 100% and to the expense amount
///
/// # Errors
///
/// `AllocationMismatch` if either sum is off by more than [`ALLOCATION_TOLERANCE`].
pub fn verify(
    expense_id: ExpenseId,
    expense_amount: &Money,
    allocations: &[ExpenseAllocation],
) -> Result<(), InventoryError> {
    let live: Vec<&ExpenseAllocation> = allocations
        .iter()
        .filter(|a| a.expense_id == expense_id && !a.superseded)
        .collect();

    let pct_total: Decimal = live.iter().map(|a| a.percentage).sum();
    if (pct_total - dec!(100)).abs() > ALLOCATION_TOLERANCE {
        return Err(InventoryError::AllocationMismatch {
            expense_id,
            detail: format!("percentages sum to {}", pct_total),
        });
    }

    let amount_total = Money::sum(expense_amount.currency(), live.iter().map(|a| &a.amount))?;
    let diff = amount_total.checked_sub(expense_amount)?;
    if diff.amount().abs() > ALLOCATION_TOLERANCE {
        return Err(InventoryError::AllocationMismatch {
            expense_id,
            detail: format!("amounts sum to {}, expense is {}", amount_total, expense_amount),
        });
    }

    Ok(())
}

/// Rejects a second allocation of an expense that still has live shares
pub fn ensure_not_allocated(expense_id: ExpenseId, existing: &[ExpenseAllocation]) -> Result<(), InventoryError> {
    if existing.iter().any(|a| a.expense_id == expense_id && !a.superseded) {
        return Err(InventoryError::AlreadyAllocated { expense_id });
    }
    Ok(())
}
