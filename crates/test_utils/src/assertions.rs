//! Assertions over ledger figures
//!
//! Each helper names the entity and both sides of the comparison in its
//! panic message.

use core_kernel::Money;
use domain_inventory::{ExpenseAllocation, Lot, ALLOCATION_TOLERANCE};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Same currency, amounts within `tolerance`
pub fn assert_money_approx_eq(actual: &Money, expected: &Money, tolerance: Decimal) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "expected an amount in {}, got {}",
        expected.currency(),
        actual
    );
    let gap = (actual.amount() - expected.amount()).abs();
    assert!(
        gap <= tolerance,
        "{} is {} away from {} (tolerance {})",
        actual.amount(),
        gap,
        expected.amount(),
        tolerance
    );
}

pub fn assert_money_zero(money: &Money) {
    assert!(money.is_zero(), "expected nothing, got {}", money);
}

/// Asserts the lot volume conservation rules
///
/// `available = total − loss`, `remaining = available − dispatched` and
/// `remaining ≥ 0`.
pub fn assert_lot_invariants(lot: &Lot) {
    let available = lot.total_volume - lot.loss_volume;
    assert_eq!(
        lot.figures.available_volume, available,
        "lot {} available volume {} != total {} - loss {}",
        lot.id, lot.figures.available_volume, lot.total_volume, lot.loss_volume
    );
    assert_eq!(
        lot.figures.remaining_volume,
        available - lot.dispatched_volume,
        "lot {} remaining volume {} != available {} - dispatched {}",
        lot.id,
        lot.figures.remaining_volume,
        available,
        lot.dispatched_volume
    );
    assert!(
        lot.figures.remaining_volume >= Decimal::ZERO,
        "lot {} remaining volume is negative: {}",
        lot.id,
        lot.figures.remaining_volume
    );
}

/// Asserts live allocations sum to 100% and to the expense amount
pub fn assert_allocations_reconcile(allocations: &[ExpenseAllocation], expense_amount: &Money) {
    let live: Vec<&ExpenseAllocation> = allocations.iter().filter(|a| !a.superseded).collect();
    let pct: Decimal = live.iter().map(|a| a.percentage).sum();
    assert!(
        (pct - dec!(100)).abs() <= ALLOCATION_TOLERANCE,
        "allocation percentages sum to {}",
        pct
    );

    let amount: Decimal = live.iter().map(|a| a.amount.amount()).sum();
    assert!(
        (amount - expense_amount.amount()).abs() <= ALLOCATION_TOLERANCE,
        "allocation amounts sum to {}, expense is {}",
        amount,
        expense_amount
    );
}
