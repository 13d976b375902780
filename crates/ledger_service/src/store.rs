//! In-memory transactional store
//!
//! [`LedgerState`] holds every aggregate. Mutating operations go through a
//! [`UnitOfWork`], which stages clones of the entities it touches together
//! with appended ledger entries and publishes them in one step on
//! [`UnitOfWork::commit`]. Dropping a unit of work without committing
//! discards everything it staged.
//!
//! # Invariants
//!
//! - Committed state is never partially updated by a failed operation
//! - Ledger entries reach the journal only through a commit
//! - A stale version read before a suspension point is rejected as a
//!   concurrency conflict

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use core_kernel::{
    Actor, AllocationId, AuditRecord, ClientId, ExpenseId, LedgerEntryId, LiabilityId, LossId, LotId,
    SaleId, ShipmentId,
};
use domain_inventory::{Expense, ExpenseAllocation, Liability, LossRecord, Lot, Shipment};
use domain_ledger::{CashLedger, Client, LedgerEntry, LedgerError};
use domain_sales::SaleEvent;

use crate::error::ServiceError;

/// Every aggregate the service owns; also the snapshot format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerState {
    pub shipments: BTreeMap<ShipmentId, Shipment>,
    pub lots: BTreeMap<LotId, Lot>,
    pub expenses: BTreeMap<ExpenseId, Expense>,
    pub allocations: BTreeMap<AllocationId, ExpenseAllocation>,
    pub sales: BTreeMap<SaleId, SaleEvent>,
    pub clients: BTreeMap<ClientId, Client>,
    pub losses: BTreeMap<LossId, LossRecord>,
    pub liabilities: BTreeMap<LiabilityId, Liability>,
    pub ledger: CashLedger,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live lots of a shipment
    pub fn lots_of(&self, shipment_id: ShipmentId) -> impl Iterator<Item = &Lot> {
        self.lots
            .values()
            .filter(move |l| l.shipment_id == shipment_id && !l.is_deleted)
    }

    /// Allocations of an expense, superseded ones included
    pub fn allocations_of(&self, expense_id: ExpenseId) -> impl Iterator<Item = &ExpenseAllocation> {
        self.allocations
            .values()
            .filter(move |a| a.expense_id == expense_id)
    }
}

#[derive(Debug, Default)]
struct StagedChanges {
    shipments: BTreeMap<ShipmentId, Shipment>,
    lots: BTreeMap<LotId, Lot>,
    expenses: BTreeMap<ExpenseId, Expense>,
    allocations: BTreeMap<AllocationId, ExpenseAllocation>,
    sales: BTreeMap<SaleId, SaleEvent>,
    clients: BTreeMap<ClientId, Client>,
    losses: BTreeMap<LossId, LossRecord>,
    liabilities: BTreeMap<LiabilityId, Liability>,
    entries: Vec<LedgerEntry>,
}

/// Generates read, write and insert accessors for one staged collection
macro_rules! staged_collection {
    ($field:ident, $id:ty, $entity:ty, $name:literal, $get:ident, $get_mut:ident, $insert:ident) => {
        #[doc = concat!("Current view of a ", $name, ", staged copy first")]
        pub fn $get(&self, id: $id) -> Result<&$entity, ServiceError> {
            self.staged
                .$field
                .get(&id)
                .or_else(|| self.state.$field.get(&id))
                .ok_or_else(|| ServiceError::not_found($name, id))
        }

        #[doc = concat!("Stages a ", $name, " for modification")]
        pub fn $get_mut(&mut self, id: $id) -> Result<&mut $entity, ServiceError> {
            if !self.staged.$field.contains_key(&id) {
                let current = self
                    .state
                    .$field
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| ServiceError::not_found($name, id))?;
                self.staged.$field.insert(id, current);
            }
            self.staged
                .$field
                .get_mut(&id)
                .ok_or_else(|| ServiceError::not_found($name, id))
        }

        #[doc = concat!("Stages a new ", $name)]
        pub fn $insert(&mut self, entity: $entity) {
            self.staged.$field.insert(entity.id, entity);
        }
    };
}

/// Staged changes against a locked [`LedgerState`]
pub struct UnitOfWork<'a> {
    state: &'a mut LedgerState,
    staged: StagedChanges,
    audit: Vec<AuditRecord>,
}

impl<'a> UnitOfWork<'a> {
    pub fn new(state: &'a mut LedgerState) -> Self {
        Self {
            state,
            staged: StagedChanges::default(),
            audit: Vec::new(),
        }
    }

    staged_collection!(shipments, ShipmentId, Shipment, "shipment", shipment, shipment_mut, insert_shipment);
    staged_collection!(lots, LotId, Lot, "lot", lot, lot_mut, insert_lot);
    staged_collection!(expenses, ExpenseId, Expense, "expense", expense, expense_mut, insert_expense);
    staged_collection!(
        allocations,
        AllocationId,
        ExpenseAllocation,
        "allocation",
        allocation,
        allocation_mut,
        insert_allocation
    );
    staged_collection!(sales, SaleId, SaleEvent, "sale", sale, sale_mut, insert_sale);
    staged_collection!(clients, ClientId, Client, "client", client, client_mut, insert_client);
    staged_collection!(losses, LossId, LossRecord, "loss", loss, loss_mut, insert_loss);
    staged_collection!(
        liabilities,
        LiabilityId,
        Liability,
        "liability",
        liability,
        liability_mut,
        insert_liability
    );

    /// Rejects the operation if the lot changed since `expected` was read
    pub fn expect_lot_version(&self, id: LotId, expected: u64) -> Result<(), ServiceError> {
        ensure_version("lot", id, self.lot(id)?.version, expected)
    }

    /// Live lots of a shipment, including lots staged in this unit of work
    pub fn lots_of(&self, shipment_id: ShipmentId) -> Vec<&Lot> {
        let ids: BTreeSet<LotId> = self
            .state
            .lots
            .values()
            .chain(self.staged.lots.values())
            .filter(|l| l.shipment_id == shipment_id)
            .map(|l| l.id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.lot(id).ok())
            .filter(|l| !l.is_deleted)
            .collect()
    }

    /// Allocations of an expense, including staged ones
    pub fn allocations_of(&self, expense_id: ExpenseId) -> Vec<ExpenseAllocation> {
        let ids: BTreeSet<AllocationId> = self
            .state
            .allocations
            .values()
            .chain(self.staged.allocations.values())
            .filter(|a| a.expense_id == expense_id)
            .map(|a| a.id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.allocation(id).ok().cloned())
            .collect()
    }

    /// Rebuilds the shipment rollup from its current lots
    pub fn refresh_shipment(&mut self, shipment_id: ShipmentId) -> Result<(), ServiceError> {
        let lots: Vec<Lot> = self.lots_of(shipment_id).into_iter().cloned().collect();
        self.shipment_mut(shipment_id)?.apply_rollup(&lots)?;
        Ok(())
    }

    /// Stages a ledger entry for append on commit
    pub fn append_entry(&mut self, entry: LedgerEntry) -> LedgerEntryId {
        let id = entry.id;
        self.staged.entries.push(entry);
        id
    }

    /// Committed journal
    pub fn ledger(&self) -> &CashLedger {
        &self.state.ledger
    }

    /// Finds an entry, committed or staged
    pub fn ledger_entry(&self, id: LedgerEntryId) -> Result<&LedgerEntry, ServiceError> {
        self.state
            .ledger
            .get(id)
            .or_else(|| self.staged.entries.iter().find(|e| e.id == id))
            .ok_or_else(|| ServiceError::not_found("ledger entry", id))
    }

    /// Builds the offsetting entry for a committed entry
    pub fn prepare_reversal(
        &self,
        id: LedgerEntryId,
        reason: &str,
        recorded_by: &str,
        entry_date: chrono::NaiveDate,
    ) -> Result<LedgerEntry, ServiceError> {
        if self.staged.entries.iter().any(|e| e.reverses == Some(id)) {
            return Err(LedgerError::AlreadyReversed(id.to_string()).into());
        }
        Ok(self.state.ledger.prepare_reversal(id, reason, recorded_by, entry_date)?)
    }

    /// Queues an audit record, delivered after a successful commit
    pub fn audit(&mut self, record: AuditRecord) {
        self.audit.push(record);
    }

    /// Publishes every staged change and returns the audit records to deliver
    ///
    /// Shipment domain events raised during the unit of work become audit
    /// records attributed to `actor`.
    pub fn commit(mut self, actor: &Actor) -> Vec<AuditRecord> {
        let staged = std::mem::take(&mut self.staged);
        let mut audit = std::mem::take(&mut self.audit);

        for (id, mut shipment) in staged.shipments {
            for event in shipment.take_events() {
                audit.push(
                    AuditRecord::new(actor.id.clone(), event.action(), "shipment", event.shipment_id())
                        .with_after(&event),
                );
            }
            self.state.shipments.insert(id, shipment);
        }
        self.state.lots.extend(staged.lots);
        self.state.expenses.extend(staged.expenses);
        self.state.allocations.extend(staged.allocations);
        self.state.sales.extend(staged.sales);
        self.state.clients.extend(staged.clients);
        self.state.losses.extend(staged.losses);
        self.state.liabilities.extend(staged.liabilities);

        let appended = staged.entries.len();
        for entry in staged.entries {
            self.state.ledger.append(entry);
        }

        tracing::debug!(appended, audit_records = audit.len(), "unit of work committed");
        audit
    }
}

fn ensure_version(entity: &'static str, id: impl Display, current: u64, expected: u64) -> Result<(), ServiceError> {
    if current != expected {
        tracing::warn!(entity, id = %id, current, expected, "stale version");
        return Err(ServiceError::concurrency(entity, id));
    }
    Ok(())
}
