//! Full-store reconciliation
//!
//! Rebuilds every derived value from its source records and reports where
//! the stored value disagrees:
//!
//! - client totals against a replay of the cash ledger
//! - lot figures against a fresh valuation recompute
//! - lot volume conservation
//! - shipment rollups against their lots
//! - expense allocations against the expense amount
//! - sale payments against the payment entries linked to the sale

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use core_kernel::{ExpenseId, LotId, Money, SaleId, ShipmentId};
use domain_inventory::{allocation, valuation, ExpenseAllocation, LotFigures, ShipmentTotals};
use domain_ledger::{reconcile_clients, BalanceDivergence, EntryKind};

use crate::error::ServiceError;
use crate::store::LedgerState;

/// One stored value that disagrees with its source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Divergence {
    ClientBalance(BalanceDivergence),
    LotFigures {
        lot_id: LotId,
        stored: LotFigures,
        recomputed: LotFigures,
    },
    LotInvariant { lot_id: LotId, detail: String },
    LotExpenses {
        lot_id: LotId,
        stored: Money,
        allocated: Money,
    },
    ShipmentRollup {
        shipment_id: ShipmentId,
        stored: Box<ShipmentTotals>,
        rebuilt: Box<ShipmentTotals>,
    },
    ExpenseAllocation { expense_id: ExpenseId, detail: String },
    SalePayments {
        sale_id: SaleId,
        stored: Money,
        ledger: Money,
    },
}

/// Outcome of a reconciliation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub clients_checked: usize,
    pub lots_checked: usize,
    pub shipments_checked: usize,
    pub expenses_checked: usize,
    pub sales_checked: usize,
    pub divergences: Vec<Divergence>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.divergences.is_empty()
    }
}

/// Reconciles every derived value in the state
pub fn reconcile_state(state: &LedgerState) -> Result<ReconciliationReport, ServiceError> {
    let mut report = ReconciliationReport::default();

    let clients: Vec<_> = state.clients.values().filter(|c| !c.is_deleted).collect();
    report.clients_checked = clients.len();
    report.divergences.extend(
        reconcile_clients(clients, &state.ledger)?
            .into_iter()
            .map(Divergence::ClientBalance),
    );

    check_lots(state, &mut report)?;
    check_shipments(state, &mut report)?;
    check_expenses(state, &mut report);
    check_sales(state, &mut report);

    info!(
        clients = report.clients_checked,
        lots = report.lots_checked,
        shipments = report.shipments_checked,
        expenses = report.expenses_checked,
        sales = report.sales_checked,
        divergences = report.divergences.len(),
        "reconciliation finished"
    );
    Ok(report)
}

fn check_lots(state: &LedgerState, report: &mut ReconciliationReport) -> Result<(), ServiceError> {
    for lot in state.lots.values().filter(|l| !l.is_deleted) {
        report.lots_checked += 1;

        if let Err(e) = lot.check_invariants() {
            warn!(lot_id = %lot.id, error = %e, "lot violates volume conservation");
            report.divergences.push(Divergence::LotInvariant {
                lot_id: lot.id,
                detail: e.to_string(),
            });
        }

        let recomputed = valuation::derive(lot)?;
        if recomputed != lot.figures {
            warn!(lot_id = %lot.id, "stored lot figures differ from recompute");
            report.divergences.push(Divergence::LotFigures {
                lot_id: lot.id,
                stored: lot.figures.clone(),
                recomputed,
            });
        }

        let live: Vec<&ExpenseAllocation> = state
            .allocations
            .values()
            .filter(|a| a.lot_id == lot.id && !a.superseded)
            .collect();
        let allocated = Money::sum(lot.base_currency(), live.into_iter().map(|a| &a.amount))?;
        if allocated != lot.allocated_expenses {
            warn!(lot_id = %lot.id, stored = %lot.allocated_expenses, allocated = %allocated, "lot expenses differ from allocations");
            report.divergences.push(Divergence::LotExpenses {
                lot_id: lot.id,
                stored: lot.allocated_expenses,
                allocated,
            });
        }
    }
    Ok(())
}

fn check_shipments(state: &LedgerState, report: &mut ReconciliationReport) -> Result<(), ServiceError> {
    for shipment in state.shipments.values().filter(|s| !s.is_deleted) {
        report.shipments_checked += 1;
        let rebuilt = ShipmentTotals::rollup(shipment.totals.reporting_currency, state.lots_of(shipment.id))?;
        if rebuilt != shipment.totals {
            warn!(shipment_id = %shipment.id, "shipment rollup differs from its lots");
            report.divergences.push(Divergence::ShipmentRollup {
                shipment_id: shipment.id,
                stored: Box::new(shipment.totals.clone()),
                rebuilt: Box::new(rebuilt),
            });
        }
    }
    Ok(())
}

fn check_expenses(state: &LedgerState, report: &mut ReconciliationReport) {
    for expense in state.expenses.values().filter(|e| !e.is_deleted) {
        report.expenses_checked += 1;
        let allocations: Vec<ExpenseAllocation> = state.allocations_of(expense.id).cloned().collect();
        if allocations.iter().all(|a| a.superseded) {
            continue;
        }
        if let Err(e) = allocation::verify(expense.id, &expense.base_amount(), &allocations) {
            warn!(expense_id = %expense.id, error = %e, "expense allocations do not reconcile");
            report.divergences.push(Divergence::ExpenseAllocation {
                expense_id: expense.id,
                detail: e.to_string(),
            });
        }
    }
}

fn check_sales(state: &LedgerState, report: &mut ReconciliationReport) {
    for sale in state.sales.values().filter(|s| !s.is_deleted) {
        report.sales_checked += 1;
        let paid: Decimal = state
            .ledger
            .entries()
            .iter()
            .filter(|e| e.kind == EntryKind::Payment && e.sale_id == Some(sale.id))
            .map(|e| e.amount.amount())
            .sum();
        let ledger = Money::new(paid, sale.currency());
        if ledger != sale.paid_amount {
            warn!(sale_id = %sale.id, stored = %sale.paid_amount, ledger = %ledger, "sale payments differ from ledger");
            report.divergences.push(Divergence::SalePayments {
                sale_id: sale.id,
                stored: sale.paid_amount,
                ledger,
            });
        }
    }
}
