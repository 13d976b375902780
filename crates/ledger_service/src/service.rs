//! Ledger application service
//!
//! Every mutating operation follows the same shape:
//!
//! 1. Validate the request without touching state
//! 2. Resolve currency conversions (the only suspension point) against a
//!    snapshot of the versions they depend on
//! 3. Lock the store, open a [`UnitOfWork`], re-check versions and apply the
//!    ordered recompute pipeline: lot → shipment rollup → lifecycle guards,
//!    with client totals updated alongside each ledger append
//! 4. Commit, release the lock, then deliver audit records
//!
//! An error at any step drops the unit of work, so nothing it staged is
//! published.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use core_kernel::{
    Actor, AuditRecord, AuditSink, ClientId, Currency, ExpenseId, LedgerEntryId, LiabilityId, LotId, Money,
    Role, SaleId, ShipmentId,
};
use domain_fx::{CurrencyConverter, ExchangeRateProvider, ValuationConversion};
use domain_inventory::{
    allocate, allocation, AllocationMethod, Expense, ExpenseAllocation, InventoryError, Liability,
    LifecyclePolicy, LossRecord, Lot, NewLot, NewShipment, ReasonCode, Shipment, ValuationInput,
};
use domain_ledger::{Client, EntryKind, LedgerEntry};
use domain_sales::{DispatchRequest, SaleEvent, SalesError};

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::reconcile::{reconcile_state, ReconciliationReport};
use crate::store::{LedgerState, UnitOfWork};
use crate::summary::{
    ClientBalanceView, Completed, LossOutcome, LotSummary, ShipmentSummary, Warning,
};

/// Transactional entry point for every ledger operation
pub struct LedgerService {
    state: Arc<Mutex<LedgerState>>,
    converter: CurrencyConverter,
    audit: Arc<dyn AuditSink>,
    policy: LifecyclePolicy,
    config: ServiceConfig,
}

impl LedgerService {
    /// Creates a service over an empty store
    pub fn new(
        config: ServiceConfig,
        rates: Arc<dyn ExchangeRateProvider>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, ServiceError> {
        Self::with_state(config, rates, audit, LedgerState::new())
    }

    /// Creates a service over previously saved state
    pub fn with_state(
        config: ServiceConfig,
        rates: Arc<dyn ExchangeRateProvider>,
        audit: Arc<dyn AuditSink>,
        state: LedgerState,
    ) -> Result<Self, ServiceError> {
        let converter = CurrencyConverter::new(rates, config.rate_lookup_timeout())
            .with_last_resort(config.last_resort_pair(), config.last_resort_rate)?;
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            converter,
            audit,
            policy: config.lifecycle_policy(),
            config,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Shipments and lots
    // ------------------------------------------------------------------

    pub async fn create_shipment(&self, input: NewShipment, actor: &Actor) -> Result<Completed<Shipment>, ServiceError> {
        let shipment = Shipment::new(input, self.config.base_currency)?;
        let id = shipment.id;

        let mut state = self.state.lock().await;
        let mut uow = UnitOfWork::new(&mut state);
        uow.insert_shipment(shipment);
        let records = uow.commit(actor);
        let created = committed(&state.shipments, id, "shipment")?;
        drop(state);

        info!(shipment_id = %id, code = %created.code, actor = %actor.id, "shipment created");
        Ok(self.finish(created, records, Vec::new()).await)
    }

    /// Adds a lot, converting its purchase price at the shipment's intake date
    pub async fn add_lot(&self, shipment_id: ShipmentId, input: NewLot, actor: &Actor) -> Result<Completed<Lot>, ServiceError> {
        let (intake_date, base) = {
            let state = self.state.lock().await;
            let shipment = state
                .shipments
                .get(&shipment_id)
                .ok_or_else(|| ServiceError::not_found("shipment", shipment_id))?;
            shipment.ensure_mutable("add lot")?;
            (shipment.intake_date, shipment.totals.reporting_currency)
        };

        let conversion = self
            .converter
            .convert_for_valuation(input.purchase_amount, base, intake_date)
            .await;

        let mut state = self.state.lock().await;
        let mut uow = UnitOfWork::new(&mut state);
        uow.shipment(shipment_id)?.ensure_mutable("add lot")?;

        let lot = Lot::new(shipment_id, input, conversion.clone())?;
        let lot_id = lot.id;
        uow.audit(AuditRecord::new(actor.id.clone(), "lot.added", "lot", lot_id).with_after(&lot));
        uow.insert_lot(lot);
        uow.refresh_shipment(shipment_id)?;
        let records = uow.commit(actor);
        let lot = committed(&state.lots, lot_id, "lot")?;
        drop(state);

        info!(
            lot_id = %lot_id,
            shipment_id = %shipment_id,
            volume = %lot.total_volume,
            purchase = %lot.purchase_amount,
            "lot added"
        );
        let warnings = degraded_warning("lot", lot_id, &conversion).into_iter().collect();
        Ok(self.finish(lot, records, warnings).await)
    }

    pub async fn begin_closing(
        &self,
        shipment_id: ShipmentId,
        notes: Option<String>,
        actor: &Actor,
    ) -> Result<Completed<Shipment>, ServiceError> {
        self.transition_shipment(shipment_id, actor, |s, a| s.begin_closing(a, notes))
            .await
    }

    /// Manual closure with an operator-supplied reason
    pub async fn close_shipment(
        &self,
        shipment_id: ShipmentId,
        reason: ReasonCode,
        notes: Option<String>,
        actor: &Actor,
    ) -> Result<Completed<Shipment>, ServiceError> {
        self.transition_shipment(shipment_id, actor, |s, a| s.close(reason, a, notes))
            .await
    }

    pub async fn reopen_shipment(
        &self,
        shipment_id: ShipmentId,
        reason: ReasonCode,
        notes: Option<String>,
        actor: &Actor,
    ) -> Result<Completed<Shipment>, ServiceError> {
        self.transition_shipment(shipment_id, actor, |s, a| s.reopen(reason, a, notes))
            .await
    }

    pub async fn archive_shipment(
        &self,
        shipment_id: ShipmentId,
        notes: Option<String>,
        actor: &Actor,
    ) -> Result<Completed<Shipment>, ServiceError> {
        self.transition_shipment(shipment_id, actor, |s, a| s.archive(a, notes))
            .await
    }

    async fn transition_shipment(
        &self,
        shipment_id: ShipmentId,
        actor: &Actor,
        apply: impl FnOnce(&mut Shipment, &Actor) -> Result<(), InventoryError>,
    ) -> Result<Completed<Shipment>, ServiceError> {
        let mut state = self.state.lock().await;
        let mut uow = UnitOfWork::new(&mut state);
        let shipment = uow.shipment_mut(shipment_id)?;
        let from = shipment.state;
        apply(shipment, actor)?;
        let to = shipment.state;
        let records = uow.commit(actor);
        let shipment = committed(&state.shipments, shipment_id, "shipment")?;
        drop(state);

        info!(shipment_id = %shipment_id, from = %from, to = %to, actor = %actor.id, "shipment transitioned");
        Ok(self.finish(shipment, records, Vec::new()).await)
    }

    /// Retries the purchase conversion of lots whose valuation is degraded
    ///
    /// Lots for which a real rate is now available are revalued and lose
    /// their degraded marker; the rest are reported as warnings.
    pub async fn revalue_degraded_lots(
        &self,
        shipment_id: ShipmentId,
        actor: &Actor,
    ) -> Result<Completed<Vec<LotId>>, ServiceError> {
        self.retrying("revalue_degraded_lots", || self.try_revalue(shipment_id, actor))
            .await
    }

    async fn try_revalue(&self, shipment_id: ShipmentId, actor: &Actor) -> Result<Completed<Vec<LotId>>, ServiceError> {
        let (intake_date, base, candidates) = {
            let state = self.state.lock().await;
            let shipment = state
                .shipments
                .get(&shipment_id)
                .ok_or_else(|| ServiceError::not_found("shipment", shipment_id))?;
            shipment.ensure_mutable("revalue lots")?;
            let candidates: Vec<(LotId, u64, Money)> = state
                .lots_of(shipment_id)
                .filter(|l| l.degraded.iter().any(|d| d.input == ValuationInput::Purchase))
                .map(|l| (l.id, l.version, l.purchase_amount))
                .collect();
            (shipment.intake_date, shipment.totals.reporting_currency, candidates)
        };

        let mut revalued = Vec::new();
        let mut warnings = Vec::new();
        for (lot_id, version, purchase) in candidates {
            let conversion = self.converter.convert_for_valuation(purchase, base, intake_date).await;
            match degraded_warning("lot", lot_id, &conversion) {
                Some(warning) => warnings.push(warning),
                None => revalued.push((lot_id, version, conversion)),
            }
        }

        let mut state = self.state.lock().await;
        let mut uow = UnitOfWork::new(&mut state);
        for (lot_id, version, conversion) in &revalued {
            uow.expect_lot_version(*lot_id, *version)?;
            let lot = uow.lot_mut(*lot_id)?;
            lot.revalue_purchase(conversion.clone())?;
            let after = lot.clone();
            uow.audit(AuditRecord::new(actor.id.clone(), "lot.revalued", "lot", lot_id).with_after(&after));
        }
        if !revalued.is_empty() {
            uow.refresh_shipment(shipment_id)?;
        }
        let records = uow.commit(actor);
        drop(state);

        let ids: Vec<LotId> = revalued.into_iter().map(|(id, _, _)| id).collect();
        info!(shipment_id = %shipment_id, revalued = ids.len(), still_degraded = warnings.len(), "degraded lots revalued");
        Ok(self.finish(ids, records, warnings).await)
    }

    // ------------------------------------------------------------------
    // Expenses
    // ------------------------------------------------------------------

    /// Records a shipment expense and its cash ledger entry
    ///
    /// The amount is converted to the base currency at the expense date
    /// for later allocation.
    pub async fn record_expense(
        &self,
        shipment_id: ShipmentId,
        description: &str,
        amount: Money,
        expense_date: NaiveDate,
        actor: &Actor,
    ) -> Result<Completed<Expense>, ServiceError> {
        let base = {
            let state = self.state.lock().await;
            let shipment = state
                .shipments
                .get(&shipment_id)
                .ok_or_else(|| ServiceError::not_found("shipment", shipment_id))?;
            shipment.ensure_mutable("record expense")?;
            shipment.totals.reporting_currency
        };

        let conversion = self.converter.convert_for_valuation(amount, base, expense_date).await;

        let mut state = self.state.lock().await;
        let mut uow = UnitOfWork::new(&mut state);
        uow.shipment(shipment_id)?.ensure_mutable("record expense")?;

        let expense = Expense::new(
            shipment_id,
            description,
            amount,
            expense_date,
            conversion.clone(),
            actor.id.clone(),
        )?;
        let expense_id = expense.id;
        let entry = LedgerEntry::builder(EntryKind::Expense, amount, expense_date)
            .shipment(shipment_id)
            .expense(expense_id)
            .description(description)
            .recorded_by(actor.id.clone())
            .build()?;
        uow.append_entry(entry);
        uow.audit(AuditRecord::new(actor.id.clone(), "expense.recorded", "expense", expense_id).with_after(&expense));
        uow.insert_expense(expense);
        let records = uow.commit(actor);
        let expense = committed(&state.expenses, expense_id, "expense")?;
        drop(state);

        info!(expense_id = %expense_id, shipment_id = %shipment_id, amount = %amount, "expense recorded");
        let warnings = degraded_warning("expense", expense_id, &conversion).into_iter().collect();
        Ok(self.finish(expense, records, warnings).await)
    }

    /// Splits an expense across lots of its shipment
    ///
    /// An empty `lot_ids` targets every live lot of the shipment. With
    /// `supersede` the expense's current allocations are marked superseded
    /// and backed out of their lots first; without it an already-allocated
    /// expense is rejected.
    pub async fn allocate_expense(
        &self,
        expense_id: ExpenseId,
        lot_ids: Vec<LotId>,
        method: AllocationMethod,
        supersede: bool,
        actor: &Actor,
    ) -> Result<Completed<Vec<ExpenseAllocation>>, ServiceError> {
        let mut state = self.state.lock().await;
        let mut uow = UnitOfWork::new(&mut state);

        let expense = uow.expense(expense_id)?.clone();
        if expense.is_deleted {
            return Err(InventoryError::Deleted {
                entity: "Expense".to_string(),
                id: expense_id.to_string(),
            }
            .into());
        }
        let shipment_id = expense.shipment_id;
        uow.shipment(shipment_id)?.ensure_mutable("allocate expense")?;

        let existing = uow.allocations_of(expense_id);
        if supersede {
            supersede_allocations(&mut uow, &existing)?;
        } else {
            allocation::ensure_not_allocated(expense_id, &existing)?;
        }

        let targets: Vec<LotId> = if lot_ids.is_empty() {
            uow.lots_of(shipment_id).iter().map(|l| l.id).collect()
        } else {
            lot_ids
        };
        let lots = targets
            .iter()
            .map(|id| uow.lot(*id).cloned())
            .collect::<Result<Vec<Lot>, ServiceError>>()?;
        if let Some(foreign) = lots.iter().find(|l| l.shipment_id != shipment_id) {
            return Err(InventoryError::LotNotInShipment {
                lot_id: foreign.id,
                shipment_id,
            }
            .into());
        }

        let refs: Vec<&Lot> = lots.iter().collect();
        let allocations = allocate(expense_id, expense.base_amount(), &refs, method)?;
        for share in &allocations {
            let lot = uow.lot_mut(share.lot_id)?;
            lot.apply_allocation(share)?;
            lot.note_conversion(ValuationInput::Expense(expense_id), &expense.base_conversion);
            uow.insert_allocation(share.clone());
        }
        uow.refresh_shipment(shipment_id)?;
        uow.audit(
            AuditRecord::new(actor.id.clone(), "expense.allocated", "expense", expense_id)
                .with_before(&existing)
                .with_after(&allocations),
        );
        let records = uow.commit(actor);
        drop(state);

        info!(
            expense_id = %expense_id,
            method = %method,
            lots = allocations.len(),
            superseded = supersede,
            "expense allocated"
        );
        Ok(self.finish(allocations, records, Vec::new()).await)
    }

    /// Soft-deletes an expense
    ///
    /// Its live allocations are superseded and backed out of their lots, and
    /// its cash ledger entry is offset by a reversal.
    pub async fn delete_expense(
        &self,
        expense_id: ExpenseId,
        reason: &str,
        entry_date: NaiveDate,
        actor: &Actor,
    ) -> Result<Completed<Expense>, ServiceError> {
        let mut state = self.state.lock().await;
        let mut uow = UnitOfWork::new(&mut state);

        let shipment_id = uow.expense(expense_id)?.shipment_id;
        uow.shipment(shipment_id)?.ensure_mutable("delete expense")?;
        uow.expense_mut(expense_id)?.soft_delete()?;

        let existing = uow.allocations_of(expense_id);
        supersede_allocations(&mut uow, &existing)?;
        uow.refresh_shipment(shipment_id)?;

        let original = uow
            .ledger()
            .entries()
            .iter()
            .find(|e| e.kind == EntryKind::Expense && e.expense_id == Some(expense_id) && !e.is_reversal())
            .map(|e| e.id);
        if let Some(entry_id) = original {
            let reversal = uow.prepare_reversal(entry_id, reason, &actor.id, entry_date)?;
            uow.append_entry(reversal);
        }

        let deleted = uow.expense(expense_id)?.clone();
        uow.audit(AuditRecord::new(actor.id.clone(), "expense.deleted", "expense", expense_id).with_after(&deleted));
        let records = uow.commit(actor);
        drop(state);

        info!(expense_id = %expense_id, allocations = existing.len(), "expense deleted");
        Ok(self.finish(deleted, records, Vec::new()).await)
    }

    // ------------------------------------------------------------------
    // Sales and payments
    // ------------------------------------------------------------------

    /// Dispatches accepted volume from a lot to a client as one atomic unit
    ///
    /// Creates the sale, the debt-creation entry and (if anything was paid)
    /// the payment entry, consumes lot inventory, updates client totals,
    /// rebuilds the shipment rollup and evaluates auto-close. A conflicting
    /// concurrent change to the lot is retried up to `conflict_retries`
    /// times.
    pub async fn dispatch_sale(&self, request: DispatchRequest, actor: &Actor) -> Result<Completed<SaleEvent>, ServiceError> {
        request.validate()?;
        self.retrying("dispatch_sale", || self.try_dispatch(&request, actor))
            .await
    }

    async fn try_dispatch(&self, request: &DispatchRequest, actor: &Actor) -> Result<Completed<SaleEvent>, ServiceError> {
        let (lot_version, base) = {
            let state = self.state.lock().await;
            let lot = state
                .lots
                .get(&request.lot_id)
                .ok_or_else(|| ServiceError::not_found("lot", request.lot_id))?;
            request.check_inventory(lot)?;
            (lot.version, lot.base_currency())
        };

        let revenue = self
            .converter
            .convert_for_valuation(request.total_price(), base, request.sale_date)
            .await;

        let mut state = self.state.lock().await;
        let mut uow = UnitOfWork::new(&mut state);
        uow.expect_lot_version(request.lot_id, lot_version)?;

        let lot = uow.lot(request.lot_id)?.clone();
        let shipment_id = lot.shipment_id;
        uow.shipment(shipment_id)?.ensure_dispatchable()?;
        if uow.client(request.client_id)?.is_deleted {
            return Err(ServiceError::not_found("client", request.client_id));
        }

        let sale = SaleEvent::create(request, &lot, revenue.clone(), actor)?;

        let lot = uow.lot_mut(sale.lot_id)?;
        lot.record_dispatch(sale.accepted_volume, revenue.amount())?;
        lot.note_conversion(ValuationInput::Sale(sale.id), &revenue);

        let description = format!("{} m3 of {} at {}", sale.accepted_volume, lot.name, sale.unit_price);
        let debt = LedgerEntry::builder(EntryKind::DebtCreation, sale.total_price, sale.sale_date)
            .client(sale.client_id)
            .shipment(shipment_id)
            .sale(sale.id)
            .description(description.clone())
            .recorded_by(actor.id.clone())
            .build()?;
        uow.client_mut(sale.client_id)?.apply(&debt)?;
        uow.append_entry(debt);

        if sale.paid_amount.is_positive() {
            let payment = LedgerEntry::builder(EntryKind::Payment, sale.paid_amount, sale.sale_date)
                .client(sale.client_id)
                .shipment(shipment_id)
                .sale(sale.id)
                .description(format!("payment at dispatch: {}", description))
                .recorded_by(actor.id.clone())
                .build()?;
            uow.client_mut(sale.client_id)?.apply(&payment)?;
            uow.append_entry(payment);
        }

        uow.shipment_mut(shipment_id)?
            .add_transit_loss(sale.transit_loss_volume);
        uow.refresh_shipment(shipment_id)?;
        let auto_closed = uow.shipment_mut(shipment_id)?.evaluate_auto_close(&self.policy)?;

        uow.audit(AuditRecord::new(actor.id.clone(), "sale.dispatched", "sale", sale.id).with_after(&sale));
        uow.insert_sale(sale.clone());
        let records = uow.commit(actor);
        let remaining = state
            .lots
            .get(&sale.lot_id)
            .map(|l| l.remaining_volume())
            .unwrap_or_default();
        drop(state);

        info!(
            sale_id = %sale.id,
            lot_id = %sale.lot_id,
            client_id = %sale.client_id,
            accepted = %sale.accepted_volume,
            total = %sale.total_price,
            paid = %sale.paid_amount,
            remaining = %remaining,
            "sale dispatched"
        );
        if let Some(reason) = auto_closed {
            info!(shipment_id = %shipment_id, reason = %reason, "shipment auto-closed");
        }

        let warnings = degraded_warning("lot", sale.lot_id, &revenue).into_iter().collect();
        Ok(self.finish(sale, records, warnings).await)
    }

    /// Records a payment from a client, optionally against one sale
    ///
    /// A payment against a sale must be in the sale's currency and may not
    /// exceed its outstanding debt. A general payment may leave the client
    /// in credit.
    pub async fn record_payment(
        &self,
        client_id: ClientId,
        amount: Money,
        sale_id: Option<SaleId>,
        payment_date: NaiveDate,
        actor: &Actor,
    ) -> Result<Completed<LedgerEntry>, ServiceError> {
        if !amount.is_positive() {
            return Err(SalesError::InvalidPayment(amount.amount()).into());
        }

        let mut state = self.state.lock().await;
        let mut uow = UnitOfWork::new(&mut state);
        if uow.client(client_id)?.is_deleted {
            return Err(ServiceError::not_found("client", client_id));
        }

        let mut builder = LedgerEntry::builder(EntryKind::Payment, amount, payment_date)
            .client(client_id)
            .recorded_by(actor.id.clone());
        if let Some(sale_id) = sale_id {
            let sale = uow.sale_mut(sale_id)?;
            if sale.client_id != client_id {
                return Err(ServiceError::Conflict(format!(
                    "sale {} belongs to client {}, not {}",
                    sale_id, sale.client_id, client_id
                )));
            }
            sale.record_payment(&amount)?;
            builder = builder
                .sale(sale_id)
                .shipment(sale.shipment_id)
                .description(format!("payment against sale {}", sale_id));
        } else {
            builder = builder.description("payment on account");
        }

        let entry = builder.build()?;
        uow.client_mut(client_id)?.apply(&entry)?;
        uow.append_entry(entry.clone());
        uow.audit(AuditRecord::new(actor.id.clone(), "payment.recorded", "ledger_entry", entry.id).with_after(&entry));
        let records = uow.commit(actor);
        drop(state);

        info!(entry_id = %entry.id, client_id = %client_id, amount = %amount, "payment recorded");
        Ok(self.finish(entry, records, Vec::new()).await)
    }

    // ------------------------------------------------------------------
    // Losses and liabilities
    // ------------------------------------------------------------------

    /// Writes off lot volume and opens a liability if a party is named
    pub async fn record_loss(
        &self,
        lot_id: LotId,
        volume: Decimal,
        reason: &str,
        responsible_party: Option<String>,
        actor: &Actor,
    ) -> Result<Completed<LossOutcome>, ServiceError> {
        let mut state = self.state.lock().await;
        let mut uow = UnitOfWork::new(&mut state);

        let lot = uow.lot(lot_id)?.clone();
        let shipment_id = lot.shipment_id;
        uow.shipment(shipment_id)?.ensure_mutable("record loss")?;

        let mut loss = LossRecord::new(&lot, volume, reason, responsible_party, actor)?;
        uow.lot_mut(lot_id)?.record_loss(loss.volume)?;
        let liability = loss.open_liability();

        uow.refresh_shipment(shipment_id)?;
        uow.shipment_mut(shipment_id)?.evaluate_auto_close(&self.policy)?;

        uow.audit(AuditRecord::new(actor.id.clone(), "loss.recorded", "loss", loss.id).with_after(&loss));
        if let Some(liability) = &liability {
            uow.audit(
                AuditRecord::new(actor.id.clone(), "liability.reported", "liability", liability.id)
                    .with_after(liability),
            );
            uow.insert_liability(liability.clone());
        }
        uow.insert_loss(loss.clone());
        let records = uow.commit(actor);
        drop(state);

        info!(
            loss_id = %loss.id,
            lot_id = %lot_id,
            volume = %loss.volume,
            estimated_value = %loss.estimated_value,
            liability = liability.is_some(),
            "loss recorded"
        );
        Ok(self.finish(LossOutcome { loss, liability }, records, Vec::new()).await)
    }

    /// Reported → acknowledged; Manager or Admin
    pub async fn acknowledge_liability(
        &self,
        liability_id: LiabilityId,
        notes: Option<String>,
        actor: &Actor,
    ) -> Result<Completed<Liability>, ServiceError> {
        self.update_liability(liability_id, actor, "liability.acknowledged", |l, a| l.acknowledge(a, notes))
            .await
    }

    /// Acknowledged → resolved; Manager or Admin
    pub async fn resolve_liability(
        &self,
        liability_id: LiabilityId,
        notes: Option<String>,
        actor: &Actor,
    ) -> Result<Completed<Liability>, ServiceError> {
        self.update_liability(liability_id, actor, "liability.resolved", |l, a| l.resolve(a, notes))
            .await
    }

    /// Acknowledged → paid; Accountant or Admin
    pub async fn mark_liability_paid(
        &self,
        liability_id: LiabilityId,
        notes: Option<String>,
        actor: &Actor,
    ) -> Result<Completed<Liability>, ServiceError> {
        self.update_liability(liability_id, actor, "liability.paid", |l, a| l.mark_paid(a, notes))
            .await
    }

    /// Acknowledged → waived; Admin only
    pub async fn waive_liability(
        &self,
        liability_id: LiabilityId,
        notes: Option<String>,
        actor: &Actor,
    ) -> Result<Completed<Liability>, ServiceError> {
        self.update_liability(liability_id, actor, "liability.waived", |l, a| l.waive(a, notes))
            .await
    }

    /// Changes the liable share of the estimated loss value while open
    pub async fn adjust_liability_percentage(
        &self,
        liability_id: LiabilityId,
        percentage: Decimal,
        actor: &Actor,
    ) -> Result<Completed<Liability>, ServiceError> {
        self.update_liability(liability_id, actor, "liability.adjusted", |l, a| {
            l.adjust_percentage(percentage, a)
        })
        .await
    }

    async fn update_liability(
        &self,
        liability_id: LiabilityId,
        actor: &Actor,
        action: &'static str,
        apply: impl FnOnce(&mut Liability, &Actor) -> Result<(), InventoryError>,
    ) -> Result<Completed<Liability>, ServiceError> {
        let mut state = self.state.lock().await;
        let mut uow = UnitOfWork::new(&mut state);
        let liability = uow.liability_mut(liability_id)?;
        let before = liability.clone();
        apply(liability, actor)?;
        let after = liability.clone();
        uow.audit(
            AuditRecord::new(actor.id.clone(), action, "liability", liability_id)
                .with_before(&before)
                .with_after(&after),
        );
        let records = uow.commit(actor);
        drop(state);

        info!(liability_id = %liability_id, state = %after.state, amount = %after.amount, action, "liability updated");
        Ok(self.finish(after, records, Vec::new()).await)
    }

    // ------------------------------------------------------------------
    // Clients and the cash ledger
    // ------------------------------------------------------------------

    pub async fn create_client(&self, name: &str, actor: &Actor) -> Result<Completed<Client>, ServiceError> {
        let client = Client::new(name)?;
        let id = client.id;

        let mut state = self.state.lock().await;
        let mut uow = UnitOfWork::new(&mut state);
        uow.audit(AuditRecord::new(actor.id.clone(), "client.created", "client", id).with_after(&client));
        uow.insert_client(client);
        let records = uow.commit(actor);
        let client = committed(&state.clients, id, "client")?;
        drop(state);

        info!(client_id = %id, "client created");
        Ok(self.finish(client, records, Vec::new()).await)
    }

    /// Books debt a client carried over from before the ledger existed
    pub async fn record_opening_balance(
        &self,
        client_id: ClientId,
        amount: Money,
        as_of: NaiveDate,
        actor: &Actor,
    ) -> Result<Completed<LedgerEntry>, ServiceError> {
        let mut state = self.state.lock().await;
        let mut uow = UnitOfWork::new(&mut state);
        if uow.client(client_id)?.is_deleted {
            return Err(ServiceError::not_found("client", client_id));
        }

        let entry = LedgerEntry::builder(EntryKind::OpeningBalance, amount, as_of)
            .client(client_id)
            .description("opening balance")
            .recorded_by(actor.id.clone())
            .build()?;
        uow.client_mut(client_id)?.apply(&entry)?;
        uow.append_entry(entry.clone());
        uow.audit(AuditRecord::new(actor.id.clone(), "ledger.opening_balance", "ledger_entry", entry.id).with_after(&entry));
        let records = uow.commit(actor);
        drop(state);

        info!(entry_id = %entry.id, client_id = %client_id, amount = %amount, "opening balance recorded");
        Ok(self.finish(entry, records, Vec::new()).await)
    }

    /// Offsets a payment or opening-balance entry; Accountant or Admin
    ///
    /// Debt-creation and expense entries are corrected through the records
    /// that own them. Reversing a payment made against a sale reopens that
    /// sale's debt.
    pub async fn reverse_ledger_entry(
        &self,
        entry_id: LedgerEntryId,
        reason: &str,
        entry_date: NaiveDate,
        actor: &Actor,
    ) -> Result<Completed<LedgerEntry>, ServiceError> {
        actor.require_any(&[Role::Accountant, Role::Admin], "reverse ledger entry")?;

        let mut state = self.state.lock().await;
        let mut uow = UnitOfWork::new(&mut state);
        let original = uow.ledger_entry(entry_id)?.clone();
        match original.kind {
            EntryKind::Payment | EntryKind::OpeningBalance => {}
            EntryKind::DebtCreation | EntryKind::Expense => {
                return Err(ServiceError::Conflict(format!(
                    "{} entry {} is corrected through its owning record",
                    original.kind, entry_id
                )));
            }
        }

        let reversal = uow.prepare_reversal(entry_id, reason, &actor.id, entry_date)?;
        if let (EntryKind::Payment, Some(sale_id)) = (original.kind, original.sale_id) {
            uow.sale_mut(sale_id)?.reverse_payment(&original.amount)?;
        }
        if let Some(client_id) = reversal.client_id {
            uow.client_mut(client_id)?.apply(&reversal)?;
        }
        uow.append_entry(reversal.clone());
        uow.audit(
            AuditRecord::new(actor.id.clone(), "ledger.reversed", "ledger_entry", entry_id)
                .with_before(&original)
                .with_after(&reversal),
        );
        let records = uow.commit(actor);
        drop(state);

        info!(entry_id = %entry_id, reversal_id = %reversal.id, reason, "ledger entry reversed");
        Ok(self.finish(reversal, records, Vec::new()).await)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub async fn get_shipment_summary(&self, shipment_id: ShipmentId) -> Result<ShipmentSummary, ServiceError> {
        let state = self.state.lock().await;
        let shipment = state
            .shipments
            .get(&shipment_id)
            .filter(|s| !s.is_deleted)
            .ok_or_else(|| ServiceError::not_found("shipment", shipment_id))?;

        let lots: Vec<LotSummary> = state.lots_of(shipment_id).map(LotSummary::from).collect();
        let expense_count = state
            .expenses
            .values()
            .filter(|e| e.shipment_id == shipment_id && !e.is_deleted)
            .count();
        let open_liabilities = state
            .losses
            .values()
            .filter(|l| l.shipment_id == shipment_id && !l.is_deleted)
            .filter_map(|l| l.liability_id)
            .filter(|id| state.liabilities.get(id).is_some_and(|l| l.state.is_open()))
            .collect();

        Ok(ShipmentSummary {
            id: shipment.id,
            code: shipment.code.clone(),
            intake_date: shipment.intake_date,
            route: shipment.route.clone(),
            state: shipment.state,
            totals: shipment.totals.clone(),
            transit_loss_volume: shipment.transit_loss_volume,
            lots,
            expense_count,
            open_liabilities,
            transitions: shipment.transitions.clone(),
            version: shipment.version,
        })
    }

    pub async fn get_client_balance(&self, client_id: ClientId) -> Result<ClientBalanceView, ServiceError> {
        let state = self.state.lock().await;
        let client = state
            .clients
            .get(&client_id)
            .filter(|c| !c.is_deleted)
            .ok_or_else(|| ServiceError::not_found("client", client_id))?;
        Ok(ClientBalanceView::from_client(client)?)
    }

    /// Signed ledger sum for a client in one currency
    pub async fn ledger_balance(&self, client_id: ClientId, currency: Currency) -> Result<Money, ServiceError> {
        let state = self.state.lock().await;
        Ok(state.ledger.client_balance(client_id, currency)?)
    }

    pub async fn lot(&self, lot_id: LotId) -> Result<Lot, ServiceError> {
        let state = self.state.lock().await;
        committed(&state.lots, lot_id, "lot")
    }

    pub async fn sale(&self, sale_id: SaleId) -> Result<SaleEvent, ServiceError> {
        let state = self.state.lock().await;
        committed(&state.sales, sale_id, "sale")
    }

    /// Replays the ledger and rebuilds every derived figure, reporting drift
    pub async fn reconcile(&self) -> Result<ReconciliationReport, ServiceError> {
        let state = self.state.lock().await;
        reconcile_state(&state)
    }

    /// Copy of the whole store, suitable for `ledger-reconcile`
    pub async fn snapshot(&self) -> LedgerState {
        self.state.lock().await.clone()
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    async fn retrying<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(e) if e.is_retryable() && retries < self.config.conflict_retries => {
                    retries += 1;
                    warn!(operation, retry = retries, error = %e, "concurrency conflict, retrying");
                }
                result => return result,
            }
        }
    }

    /// Delivers audit records after commit; failures become warnings
    async fn finish<T>(&self, value: T, records: Vec<AuditRecord>, mut warnings: Vec<Warning>) -> Completed<T> {
        for record in records {
            let action = record.action.clone();
            if let Err(e) = self.audit.record(record).await {
                warn!(action = %action, error = %e, "audit record not delivered");
                warnings.push(Warning::AuditNotRecorded {
                    action,
                    reason: e.to_string(),
                });
            }
        }
        Completed { value, warnings }
    }
}

fn committed<K: Ord + std::fmt::Display + Copy, V: Clone>(
    map: &std::collections::BTreeMap<K, V>,
    id: K,
    entity: &'static str,
) -> Result<V, ServiceError> {
    map.get(&id).cloned().ok_or_else(|| ServiceError::not_found(entity, id))
}

fn supersede_allocations(uow: &mut UnitOfWork<'_>, existing: &[ExpenseAllocation]) -> Result<(), ServiceError> {
    for share in existing.iter().filter(|a| !a.superseded) {
        uow.allocation_mut(share.id)?.superseded = true;
        uow.lot_mut(share.lot_id)?.reverse_allocation(share)?;
    }
    Ok(())
}

fn degraded_warning(entity_type: &str, id: impl ToString, conversion: &ValuationConversion) -> Option<Warning> {
    match conversion {
        ValuationConversion::Degraded { reason, fallback_rate, .. } => {
            let entity_id = id.to_string();
            warn!(entity_type, entity_id = %entity_id, fallback_rate = %fallback_rate, reason = %reason, "degraded valuation");
            Some(Warning::DegradedValuation {
                entity_type: entity_type.to_string(),
                entity_id,
                reason: reason.clone(),
            })
        }
        ValuationConversion::Converted { .. } => None,
    }
}
