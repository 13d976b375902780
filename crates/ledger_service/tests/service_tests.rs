//! Service tests
//!
//! End-to-end behavior of the ledger operations against the in-memory store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{service_with, Harness};
use core_kernel::audit::mock::FailingAuditSink;
use core_kernel::{ClientId, Currency, ErrorKind, LotId, Money, ShipmentId};
use domain_fx::provider::mock::SlowRateProvider;
use domain_fx::{ExchangeRate, InMemoryRateStore};
use domain_inventory::{AllocationMethod, LiabilityState, ReasonCode, ShipmentState};
use domain_ledger::EntryKind;
use domain_sales::{PaymentState, SaleEvent};
use ledger_service::{reconcile_state, Divergence, LedgerState, ServiceConfig, Warning};
use rust_decimal_macros::dec;
use test_utils::{
    assert_allocations_reconcile, assert_lot_invariants, assert_money_approx_eq, assert_money_zero,
    lot_volumes_strategy, positive_money_strategy, positive_usd_strategy, ActorFixtures, DateFixtures,
    DispatchBuilder, LotBuilder, MoneyFixtures, RateFixtures, ShipmentBuilder,
};

/// Scenario A: expense of 900 USD allocated to the 50,000 RUB lot
async fn scenario_a(h: &Harness) -> (ShipmentId, LotId) {
    let operator = ActorFixtures::operator();
    let (shipment_id, lot_id) = h.scenario_lot().await;
    let expense = h
        .service
        .record_expense(shipment_id, "rail freight", MoneyFixtures::usd_expense(), DateFixtures::intake(), &operator)
        .await
        .unwrap()
        .value;
    h.service
        .allocate_expense(expense.id, vec![lot_id], AllocationMethod::VolumeBased, false, &operator)
        .await
        .unwrap();
    (shipment_id, lot_id)
}

/// Scenario B: 30 m³ dispatched at 20 USD with 300 paid
async fn scenario_b(h: &Harness) -> (ShipmentId, LotId, ClientId, SaleEvent) {
    let (shipment_id, lot_id) = scenario_a(h).await;
    let client = h.client("Sawmill 4").await;
    let sale = h
        .service
        .dispatch_sale(DispatchBuilder::new(lot_id, client).build(), &ActorFixtures::operator())
        .await
        .unwrap()
        .value;
    (shipment_id, lot_id, client, sale)
}

// ============================================================================
// Worked scenarios
// ============================================================================

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn test_scenario_a_unit_cost_before_and_after_expense() {
        let h = Harness::new();
        let (_, lot_id) = h.scenario_lot().await;

        let lot = h.service.lot(lot_id).await.unwrap();
        assert_money_approx_eq(&lot.figures.investment, &MoneyFixtures::usd(dec!(555.56)), dec!(0.01));
        assert_money_approx_eq(&lot.figures.unit_cost, &MoneyFixtures::usd(dec!(5.556)), dec!(0.001));

        let h = Harness::new();
        let (_, lot_id) = scenario_a(&h).await;
        let lot = h.service.lot(lot_id).await.unwrap();
        assert_eq!(lot.allocated_expenses, MoneyFixtures::usd(dec!(900)));
        assert_money_approx_eq(&lot.figures.investment, &MoneyFixtures::usd(dec!(1455.56)), dec!(0.01));
        assert_money_approx_eq(&lot.figures.unit_cost, &MoneyFixtures::usd(dec!(14.56)), dec!(0.01));
        assert!(!lot.is_degraded());
    }

    #[tokio::test]
    async fn test_scenario_b_partial_payment_dispatch() {
        let h = Harness::new();
        let (shipment_id, lot_id, client, sale) = scenario_b(&h).await;

        assert_eq!(sale.total_price, MoneyFixtures::usd(dec!(600)));
        assert_eq!(sale.debt, MoneyFixtures::usd(dec!(300)));
        assert_eq!(sale.payment_state, PaymentState::Partial);

        let lot = h.service.lot(lot_id).await.unwrap();
        assert_eq!(lot.remaining_volume(), dec!(70));
        assert_money_approx_eq(&lot.figures.realized_profit, &MoneyFixtures::usd(dec!(163.33)), dec!(0.01));
        assert_lot_invariants(&lot);

        let balance = h.service.get_client_balance(client).await.unwrap();
        let usd = balance.currency(Currency::USD).unwrap();
        assert_eq!(usd.issued.amount(), dec!(600));
        assert_eq!(usd.paid.amount(), dec!(300));
        assert_eq!(usd.current_debt.amount(), dec!(300));
        assert_eq!(
            h.service.ledger_balance(client, Currency::USD).await.unwrap(),
            usd.net
        );

        let summary = h.service.get_shipment_summary(shipment_id).await.unwrap();
        assert_eq!(summary.state, ShipmentState::Active);
        assert_eq!(summary.totals.dispatched_volume, dec!(30));
        assert_eq!(summary.lots.len(), 1);
    }

    #[tokio::test]
    async fn test_scenario_c_oversized_dispatch_changes_nothing() {
        let h = Harness::new();
        let (_, lot_id, client, _) = scenario_b(&h).await;
        let before = h.service.snapshot().await;

        let err = h
            .service
            .dispatch_sale(
                DispatchBuilder::new(lot_id, client).sent(dec!(71)).build(),
                &ActorFixtures::operator(),
            )
            .await
            .unwrap_err();
        assert!(err.is_insufficient_inventory());
        assert_eq!(err.kind(), ErrorKind::Validation);

        let after = h.service.snapshot().await;
        assert_eq!(after.ledger.len(), before.ledger.len());
        assert_eq!(after.sales.len(), before.sales.len());
        assert_eq!(after.lots[&lot_id].version, before.lots[&lot_id].version);
        assert_eq!(after.clients[&client].balances, before.clients[&client].balances);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_scenario_d_concurrent_dispatches_never_oversell() {
        let h = Harness::new();
        let (_, lot_id, client, _) = scenario_b(&h).await;

        let mut handles = Vec::new();
        for _ in 0..2 {
            let service = Arc::clone(&h.service);
            let request = DispatchBuilder::new(lot_id, client).sent(dec!(40)).paid(dec!(0)).build();
            handles.push(tokio::spawn(async move {
                let actor = ActorFixtures::operator();
                service.dispatch_sale(request, &actor).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(e) => assert!(e.is_insufficient_inventory() || e.is_retryable(), "unexpected error: {}", e),
            }
        }
        assert_eq!(succeeded, 1);

        let lot = h.service.lot(lot_id).await.unwrap();
        assert_eq!(lot.remaining_volume(), dec!(30));
        assert_lot_invariants(&lot);
        assert!(h.service.reconcile().await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_exact_remaining_dispatch_succeeds_and_one_litre_more_fails() {
        let h = Harness::new();
        let (shipment_id, lot_id) = h.scenario_lot().await;
        let client = h.client("Depot").await;
        let operator = ActorFixtures::operator();

        let err = h
            .service
            .dispatch_sale(DispatchBuilder::new(lot_id, client).sent(dec!(100.001)).build(), &operator)
            .await
            .unwrap_err();
        assert!(err.is_insufficient_inventory());

        h.service
            .dispatch_sale(DispatchBuilder::new(lot_id, client).sent(dec!(100)).build(), &operator)
            .await
            .unwrap();
        let lot = h.service.lot(lot_id).await.unwrap();
        assert_eq!(lot.remaining_volume(), dec!(0));

        let summary = h.service.get_shipment_summary(shipment_id).await.unwrap();
        assert_eq!(summary.state, ShipmentState::Closed);
        assert_eq!(summary.transitions.last().unwrap().reason, ReasonCode::FullySold);
        assert!(h.audit.actions().await.contains(&"shipment.closed".to_string()));
    }
}

// ============================================================================
// Shipment lifecycle
// ============================================================================

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_close_reopen_archive() {
        let h = Harness::new();
        let (shipment_id, lot_id) = h.scenario_lot().await;
        let client = h.client("Depot").await;
        let operator = ActorFixtures::operator();

        let closed = h
            .service
            .close_shipment(shipment_id, ReasonCode::Manual, Some("stocktake".into()), &operator)
            .await
            .unwrap()
            .value;
        assert_eq!(closed.state, ShipmentState::Closed);

        let err = h
            .service
            .dispatch_sale(DispatchBuilder::new(lot_id, client).build(), &operator)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lifecycle);

        let reopened = h
            .service
            .reopen_shipment(shipment_id, ReasonCode::BusinessDecision, None, &operator)
            .await
            .unwrap()
            .value;
        assert_eq!(reopened.state, ShipmentState::Active);

        h.service
            .close_shipment(shipment_id, ReasonCode::Manual, None, &operator)
            .await
            .unwrap();
        h.service.archive_shipment(shipment_id, None, &operator).await.unwrap();

        let err = h
            .service
            .reopen_shipment(shipment_id, ReasonCode::Manual, None, &operator)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lifecycle);

        let err = h
            .service
            .record_expense(shipment_id, "late invoice", MoneyFixtures::usd(dec!(10)), DateFixtures::sale(), &operator)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lifecycle);

        let summary = h.service.get_shipment_summary(shipment_id).await.unwrap();
        assert_eq!(summary.transitions.len(), 4);
        assert_eq!(summary.transitions[0].actor, operator.id);
    }

    #[tokio::test]
    async fn test_closing_shipment_still_dispatches() {
        let h = Harness::new();
        let (shipment_id, lot_id) = h.scenario_lot().await;
        let client = h.client("Depot").await;
        let operator = ActorFixtures::operator();

        h.service.begin_closing(shipment_id, None, &operator).await.unwrap();
        h.service
            .dispatch_sale(DispatchBuilder::new(lot_id, client).build(), &operator)
            .await
            .unwrap();

        let summary = h.service.get_shipment_summary(shipment_id).await.unwrap();
        assert_eq!(summary.state, ShipmentState::Closing);
    }

    #[tokio::test]
    async fn test_small_remainder_auto_closes() {
        let h = Harness::new();
        let (shipment_id, lot_id) = h.scenario_lot().await;
        let client = h.client("Depot").await;

        h.service
            .dispatch_sale(
                DispatchBuilder::new(lot_id, client).sent(dec!(99.6)).paid(dec!(0)).build(),
                &ActorFixtures::operator(),
            )
            .await
            .unwrap();

        let summary = h.service.get_shipment_summary(shipment_id).await.unwrap();
        assert_eq!(summary.state, ShipmentState::Closed);
        assert_eq!(summary.transitions[0].reason, ReasonCode::RemainingTooSmall);
        assert_eq!(summary.transitions[0].actor, "system");
    }

    #[tokio::test]
    async fn test_transit_loss_rolls_into_shipment_not_lot() {
        let h = Harness::new();
        let (shipment_id, lot_id) = h.scenario_lot().await;
        let client = h.client("Depot").await;

        let sale = h
            .service
            .dispatch_sale(
                DispatchBuilder::new(lot_id, client).sent(dec!(32)).transit_loss(dec!(2)).build(),
                &ActorFixtures::operator(),
            )
            .await
            .unwrap()
            .value;
        assert_eq!(sale.accepted_volume, dec!(30));
        assert_eq!(sale.total_price.amount(), dec!(600));

        let summary = h.service.get_shipment_summary(shipment_id).await.unwrap();
        assert_eq!(summary.transit_loss_volume, dec!(2));
        assert_eq!(summary.totals.loss_volume, dec!(0));
        assert_eq!(summary.totals.remaining_volume, dec!(70));
    }
}

// ============================================================================
// Currency conversion and degraded valuation
// ============================================================================

mod valuation {
    use super::*;

    #[tokio::test]
    async fn test_missing_rate_degrades_then_revalues() {
        let h = Harness::without_rates();
        let operator = ActorFixtures::operator();
        let shipment = h
            .service
            .create_shipment(ShipmentBuilder::new().build(), &operator)
            .await
            .unwrap()
            .value;

        let added = h
            .service
            .add_lot(shipment.id, LotBuilder::new().build(), &operator)
            .await
            .unwrap();
        assert!(matches!(
            added.warnings.as_slice(),
            [Warning::DegradedValuation { entity_type, .. }] if entity_type == "lot"
        ));
        let lot = added.value;
        assert!(lot.is_degraded());
        assert_money_approx_eq(&lot.purchase_conversion.amount(), &MoneyFixtures::usd(dec!(555.5556)), dec!(0.0001));

        let summary = h.service.get_shipment_summary(shipment.id).await.unwrap();
        assert_eq!(summary.totals.degraded_lots, 1);
        assert!(summary.lots[0].degraded_valuation);

        h.rates
            .insert(ExchangeRate::new(RateFixtures::usd_rub(), dec!(100), DateFixtures::intake()).unwrap())
            .await;
        let revalued = h.service.revalue_degraded_lots(shipment.id, &operator).await.unwrap();
        assert_eq!(revalued.value, vec![lot.id]);
        assert!(revalued.warnings.is_empty());

        let lot = h.service.lot(lot.id).await.unwrap();
        assert!(!lot.is_degraded());
        assert_eq!(lot.figures.investment, MoneyFixtures::usd(dec!(500)));
        let summary = h.service.get_shipment_summary(shipment.id).await.unwrap();
        assert_eq!(summary.totals.degraded_lots, 0);
    }

    #[tokio::test]
    async fn test_slow_rate_provider_falls_back_within_timeout() {
        let config = ServiceConfig {
            rate_lookup_timeout_ms: 20,
            ..ServiceConfig::default()
        };
        let slow = SlowRateProvider::new(
            InMemoryRateStore::from_history(RateFixtures::history()),
            Duration::from_millis(500),
        );
        let service = service_with(config, Arc::new(slow), Arc::new(FailingAuditSink));
        let operator = ActorFixtures::operator();
        let shipment = service
            .create_shipment(ShipmentBuilder::new().build(), &operator)
            .await
            .unwrap()
            .value;

        let started = std::time::Instant::now();
        let added = service
            .add_lot(shipment.id, LotBuilder::new().build(), &operator)
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(added.value.is_degraded());
        assert!(added
            .warnings
            .iter()
            .any(|w| matches!(w, Warning::DegradedValuation { .. })));
    }

    #[tokio::test]
    async fn test_degraded_sale_revenue_is_recorded_on_lot() {
        let h = Harness::without_rates();
        let operator = ActorFixtures::operator();
        let shipment = h
            .service
            .create_shipment(ShipmentBuilder::new().build(), &operator)
            .await
            .unwrap()
            .value;
        let lot = h
            .service
            .add_lot(
                shipment.id,
                LotBuilder::new().with_purchase(MoneyFixtures::usd(dec!(1000))).build(),
                &operator,
            )
            .await
            .unwrap()
            .value;
        assert!(!lot.is_degraded());
        let client = h.client("Bukhara Timber").await;

        let sold = h
            .service
            .dispatch_sale(
                DispatchBuilder::new(lot.id, client)
                    .price(dec!(1800), Currency::RUB)
                    .paid(dec!(0))
                    .build(),
                &operator,
            )
            .await
            .unwrap();
        assert!(sold.has_warnings());
        assert_eq!(sold.value.total_price, MoneyFixtures::rub(dec!(54000)));

        let lot = h.service.lot(lot.id).await.unwrap();
        assert!(lot.is_degraded());
        assert_eq!(lot.revenue, MoneyFixtures::usd(dec!(600)));

        let balance = h.service.get_client_balance(client).await.unwrap();
        assert_eq!(balance.currency(Currency::RUB).unwrap().current_debt.amount(), dec!(54000));
        assert!(balance.currency(Currency::USD).is_none());
    }
}

// ============================================================================
// Payments and the cash ledger
// ============================================================================

mod payments {
    use super::*;

    #[tokio::test]
    async fn test_payment_against_sale_settles_debt() {
        let h = Harness::new();
        let (_, _, client, sale) = scenario_b(&h).await;

        h.service
            .record_payment(client, MoneyFixtures::usd(dec!(300)), Some(sale.id), DateFixtures::sale(), &ActorFixtures::accountant())
            .await
            .unwrap();

        let sale = h.service.sale(sale.id).await.unwrap();
        assert_eq!(sale.payment_state, PaymentState::Paid);
        assert_money_zero(&sale.debt);
        let balance = h.service.get_client_balance(client).await.unwrap();
        assert_money_zero(&balance.currency(Currency::USD).unwrap().current_debt);
    }

    #[tokio::test]
    async fn test_payment_in_wrong_currency_is_fatal() {
        let h = Harness::new();
        let (_, _, client, sale) = scenario_b(&h).await;
        let entries = h.service.snapshot().await.ledger.len();

        let err = h
            .service
            .record_payment(client, MoneyFixtures::rub(dec!(300)), Some(sale.id), DateFixtures::sale(), &ActorFixtures::accountant())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conversion);
        assert_eq!(h.service.snapshot().await.ledger.len(), entries);
    }

    #[tokio::test]
    async fn test_payment_on_account_can_leave_credit() {
        let h = Harness::new();
        let (_, _, client, _) = scenario_b(&h).await;

        h.service
            .record_payment(client, MoneyFixtures::usd(dec!(1000)), None, DateFixtures::sale(), &ActorFixtures::accountant())
            .await
            .unwrap();

        let balance = h.service.get_client_balance(client).await.unwrap();
        let usd = balance.currency(Currency::USD).unwrap();
        assert_eq!(usd.net.amount(), dec!(-700));
        assert_money_zero(&usd.current_debt);
    }

    #[tokio::test]
    async fn test_reversal_needs_accountant_and_reopens_sale_debt() {
        let h = Harness::new();
        let (_, _, client, sale) = scenario_b(&h).await;
        let payment = h
            .service
            .record_payment(client, MoneyFixtures::usd(dec!(300)), Some(sale.id), DateFixtures::sale(), &ActorFixtures::accountant())
            .await
            .unwrap()
            .value;

        let err = h
            .service
            .reverse_ledger_entry(payment.id, "bounced", DateFixtures::correction(), &ActorFixtures::operator())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        let reversal = h
            .service
            .reverse_ledger_entry(payment.id, "bounced", DateFixtures::correction(), &ActorFixtures::accountant())
            .await
            .unwrap()
            .value;
        assert_eq!(reversal.reverses, Some(payment.id));
        assert_eq!(reversal.amount.amount(), dec!(-300));
        assert_eq!(reversal.entry_date, DateFixtures::correction());

        let sale = h.service.sale(sale.id).await.unwrap();
        assert_eq!(sale.payment_state, PaymentState::Partial);
        assert_eq!(sale.debt.amount(), dec!(300));
        let balance = h.service.get_client_balance(client).await.unwrap();
        assert_eq!(balance.currency(Currency::USD).unwrap().current_debt.amount(), dec!(300));

        let err = h
            .service
            .reverse_ledger_entry(payment.id, "again", DateFixtures::correction(), &ActorFixtures::accountant())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert!(h.service.reconcile().await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_debt_entries_are_not_directly_reversible() {
        let h = Harness::new();
        scenario_b(&h).await;
        let debt = h
            .service
            .snapshot()
            .await
            .ledger
            .entries()
            .iter()
            .find(|e| e.kind == EntryKind::DebtCreation)
            .map(|e| e.id)
            .unwrap();

        let err = h
            .service
            .reverse_ledger_entry(debt, "typo", DateFixtures::correction(), &ActorFixtures::admin())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Consistency);
    }

    #[tokio::test]
    async fn test_opening_balance_in_second_currency() {
        let h = Harness::new();
        let client = h.client("Old Customer").await;

        h.service
            .record_opening_balance(client, MoneyFixtures::rub(dec!(5000)), DateFixtures::intake(), &ActorFixtures::accountant())
            .await
            .unwrap();

        let balance = h.service.get_client_balance(client).await.unwrap();
        assert_eq!(balance.currency(Currency::RUB).unwrap().current_debt.amount(), dec!(5000));
        assert_eq!(
            h.service.ledger_balance(client, Currency::RUB).await.unwrap().amount(),
            dec!(5000)
        );
    }
}

// ============================================================================
// Expenses and allocation
// ============================================================================

mod expenses {
    use super::*;

    async fn two_lot_shipment(h: &Harness) -> (ShipmentId, LotId, LotId) {
        let operator = ActorFixtures::operator();
        let (shipment_id, first) = h.scenario_lot().await;
        let second = h
            .service
            .add_lot(
                shipment_id,
                LotBuilder::new().with_name("spruce").with_volume(dec!(50)).build(),
                &operator,
            )
            .await
            .unwrap()
            .value
            .id;
        (shipment_id, first, second)
    }

    #[tokio::test]
    async fn test_second_allocation_requires_supersede() {
        let h = Harness::new();
        let operator = ActorFixtures::operator();
        let (shipment_id, first, second) = two_lot_shipment(&h).await;
        let expense = h
            .service
            .record_expense(shipment_id, "customs", MoneyFixtures::usd_expense(), DateFixtures::intake(), &operator)
            .await
            .unwrap()
            .value;

        let by_volume = h
            .service
            .allocate_expense(expense.id, Vec::new(), AllocationMethod::VolumeBased, false, &operator)
            .await
            .unwrap()
            .value;
        assert_allocations_reconcile(&by_volume, &expense.base_amount());
        assert_eq!(h.service.lot(first).await.unwrap().allocated_expenses.amount(), dec!(600));
        assert_eq!(h.service.lot(second).await.unwrap().allocated_expenses.amount(), dec!(300));

        let err = h
            .service
            .allocate_expense(expense.id, Vec::new(), AllocationMethod::EqualSplit, false, &operator)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Consistency);

        let equal = h
            .service
            .allocate_expense(expense.id, Vec::new(), AllocationMethod::EqualSplit, true, &operator)
            .await
            .unwrap()
            .value;
        assert_allocations_reconcile(&equal, &expense.base_amount());
        assert_eq!(h.service.lot(first).await.unwrap().allocated_expenses.amount(), dec!(450));
        assert_eq!(h.service.lot(second).await.unwrap().allocated_expenses.amount(), dec!(450));

        let state = h.service.snapshot().await;
        assert_eq!(state.allocations_of(expense.id).filter(|a| a.superseded).count(), 2);
        assert!(reconcile_state(&state).unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_delete_expense_backs_out_allocations() {
        let h = Harness::new();
        let operator = ActorFixtures::operator();
        let (shipment_id, lot_id) = scenario_a(&h).await;
        let expense_id = *h.service.snapshot().await.expenses.keys().next().unwrap();

        h.service
            .delete_expense(expense_id, "duplicate invoice", DateFixtures::correction(), &operator)
            .await
            .unwrap();

        let lot = h.service.lot(lot_id).await.unwrap();
        assert_money_zero(&lot.allocated_expenses);
        assert_money_approx_eq(&lot.figures.investment, &MoneyFixtures::usd(dec!(555.56)), dec!(0.01));

        let state = h.service.snapshot().await;
        let expense_entries: Vec<_> = state
            .ledger
            .entries()
            .iter()
            .filter(|e| e.expense_id == Some(expense_id))
            .collect();
        assert_eq!(expense_entries.len(), 2);
        assert!(expense_entries
            .iter()
            .any(|e| e.is_reversal() && e.entry_date == DateFixtures::correction()));
        assert!(state.ledger.balance(Currency::USD).unwrap().is_zero());
        assert!(reconcile_state(&state).unwrap().is_consistent());

        let summary = h.service.get_shipment_summary(shipment_id).await.unwrap();
        assert_eq!(summary.expense_count, 0);

        let err = h
            .service
            .delete_expense(expense_id, "again", DateFixtures::correction(), &operator)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_lot_from_other_shipment_is_rejected() {
        let h = Harness::new();
        let operator = ActorFixtures::operator();
        let (shipment_id, _) = h.scenario_lot().await;
        let (_, foreign) = h.scenario_lot().await;
        let expense = h
            .service
            .record_expense(shipment_id, "customs", MoneyFixtures::usd_expense(), DateFixtures::intake(), &operator)
            .await
            .unwrap()
            .value;

        let err = h
            .service
            .allocate_expense(expense.id, vec![foreign], AllocationMethod::VolumeBased, false, &operator)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert!(h.service.snapshot().await.allocations.is_empty());
    }

    #[tokio::test]
    async fn test_rub_expense_is_allocated_in_base_currency() {
        let h = Harness::new();
        let operator = ActorFixtures::operator();
        let (shipment_id, lot_id) = h.scenario_lot().await;
        let expense = h
            .service
            .record_expense(shipment_id, "loading crew", MoneyFixtures::rub(dec!(9000)), DateFixtures::sale(), &operator)
            .await
            .unwrap()
            .value;
        assert_eq!(expense.base_amount(), MoneyFixtures::usd(dec!(100)));

        h.service
            .allocate_expense(expense.id, vec![lot_id], AllocationMethod::ValueBased, false, &operator)
            .await
            .unwrap();
        let lot = h.service.lot(lot_id).await.unwrap();
        assert_eq!(lot.allocated_expenses, MoneyFixtures::usd(dec!(100)));
    }
}

// ============================================================================
// Losses and liabilities
// ============================================================================

mod losses {
    use super::*;

    #[tokio::test]
    async fn test_liability_workflow_checks_roles() {
        let h = Harness::new();
        let (shipment_id, lot_id) = scenario_a(&h).await;

        let outcome = h
            .service
            .record_loss(lot_id, dec!(10), "water damage", Some("Carrier LLC".into()), &ActorFixtures::operator())
            .await
            .unwrap()
            .value;
        assert_money_approx_eq(&outcome.loss.estimated_value, &MoneyFixtures::usd(dec!(145.56)), dec!(0.01));
        let liability = outcome.liability.unwrap();
        assert_eq!(liability.state, LiabilityState::Reported);
        assert_eq!(liability.amount, outcome.loss.estimated_value);

        let lot = h.service.lot(lot_id).await.unwrap();
        assert_eq!(lot.loss_volume, dec!(10));
        assert_eq!(lot.remaining_volume(), dec!(90));
        assert_lot_invariants(&lot);

        let err = h
            .service
            .acknowledge_liability(liability.id, None, &ActorFixtures::operator())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        h.service
            .acknowledge_liability(liability.id, None, &ActorFixtures::manager())
            .await
            .unwrap();
        let adjusted = h
            .service
            .adjust_liability_percentage(liability.id, dec!(50), &ActorFixtures::manager())
            .await
            .unwrap()
            .value;
        assert_money_approx_eq(&adjusted.amount, &MoneyFixtures::usd(dec!(72.78)), dec!(0.01));

        let summary = h.service.get_shipment_summary(shipment_id).await.unwrap();
        assert_eq!(summary.open_liabilities, vec![liability.id]);

        let paid = h
            .service
            .mark_liability_paid(liability.id, Some("deducted from freight".into()), &ActorFixtures::accountant())
            .await
            .unwrap()
            .value;
        assert_eq!(paid.state, LiabilityState::Paid);
        assert_eq!(paid.history.len(), 2);

        let err = h
            .service
            .adjust_liability_percentage(liability.id, dec!(20), &ActorFixtures::manager())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lifecycle);

        let summary = h.service.get_shipment_summary(shipment_id).await.unwrap();
        assert!(summary.open_liabilities.is_empty());
        assert_eq!(summary.totals.loss_volume, dec!(10));
    }

    #[tokio::test]
    async fn test_waive_is_admin_only() {
        let h = Harness::new();
        let (_, lot_id) = h.scenario_lot().await;
        let liability = h
            .service
            .record_loss(lot_id, dec!(1), "theft", Some("Guard Co".into()), &ActorFixtures::operator())
            .await
            .unwrap()
            .value
            .liability
            .unwrap();
        h.service
            .acknowledge_liability(liability.id, None, &ActorFixtures::manager())
            .await
            .unwrap();

        let err = h
            .service
            .waive_liability(liability.id, None, &ActorFixtures::manager())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        let waived = h
            .service
            .waive_liability(liability.id, Some("goodwill".into()), &ActorFixtures::admin())
            .await
            .unwrap()
            .value;
        assert_eq!(waived.state, LiabilityState::Waived);
    }

    #[tokio::test]
    async fn test_loss_without_party_opens_no_liability() {
        let h = Harness::new();
        let (_, lot_id) = h.scenario_lot().await;
        let outcome = h
            .service
            .record_loss(lot_id, dec!(2.5), "shrinkage", None, &ActorFixtures::operator())
            .await
            .unwrap()
            .value;
        assert!(outcome.liability.is_none());
        assert!(outcome.loss.liability_id.is_none());
        assert!(h.service.snapshot().await.liabilities.is_empty());
    }

    #[tokio::test]
    async fn test_loss_beyond_remaining_is_rejected() {
        let h = Harness::new();
        let (_, lot_id, _, _) = scenario_b(&h).await;
        let err = h
            .service
            .record_loss(lot_id, dec!(70.001), "fire", None, &ActorFixtures::operator())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(h.service.snapshot().await.losses.is_empty());
    }
}

// ============================================================================
// Audit
// ============================================================================

mod audit {
    use super::*;

    #[tokio::test]
    async fn test_failing_audit_sink_only_warns() {
        let service = service_with(
            ServiceConfig::default(),
            Arc::new(InMemoryRateStore::from_history(RateFixtures::history())),
            Arc::new(FailingAuditSink),
        );
        let created = service
            .create_shipment(ShipmentBuilder::new().build(), &ActorFixtures::operator())
            .await
            .unwrap();

        assert!(matches!(
            created.warnings.as_slice(),
            [Warning::AuditNotRecorded { action, .. }] if action == "shipment.created"
        ));
        assert!(service.get_shipment_summary(created.value.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_operations_are_audited_in_order() {
        let h = Harness::new();
        scenario_b(&h).await;

        let actions = h.audit.actions().await;
        let position = |name: &str| actions.iter().position(|a| a == name).unwrap();
        assert!(position("shipment.created") < position("lot.added"));
        assert!(position("expense.allocated") < position("sale.dispatched"));

        let records = h.audit.records().await;
        let dispatch = records.iter().find(|r| r.action == "sale.dispatched").unwrap();
        assert_eq!(dispatch.actor, ActorFixtures::operator().id);
        assert!(dispatch.after.is_some());
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

mod reconciliation {
    use super::*;

    async fn busy_ledger() -> Harness {
        let h = Harness::new();
        let (_, lot_id, client, sale) = scenario_b(&h).await;
        h.service
            .record_payment(client, MoneyFixtures::usd(dec!(100)), Some(sale.id), DateFixtures::sale(), &ActorFixtures::accountant())
            .await
            .unwrap();
        h.service
            .record_loss(lot_id, dec!(5), "rot", Some("Yard".into()), &ActorFixtures::operator())
            .await
            .unwrap();
        h.service
            .record_opening_balance(client, MoneyFixtures::rub(dec!(1200)), DateFixtures::intake(), &ActorFixtures::accountant())
            .await
            .unwrap();
        h
    }

    #[tokio::test]
    async fn test_consistent_store_survives_snapshot_round_trip() {
        let h = busy_ledger().await;
        let report = h.service.reconcile().await.unwrap();
        assert!(report.is_consistent(), "{:?}", report.divergences);
        assert_eq!(report.clients_checked, 1);
        assert_eq!(report.sales_checked, 1);

        let json = serde_json::to_string(&h.service.snapshot().await).unwrap();
        let restored: LedgerState = serde_json::from_str(&json).unwrap();
        assert!(reconcile_state(&restored).unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_tampered_snapshot_reports_each_drift() {
        let h = busy_ledger().await;
        let mut state = h.service.snapshot().await;

        let client = state.clients.values_mut().next().unwrap();
        client.balances.get_mut(&Currency::USD).unwrap().paid = Money::new(dec!(1), Currency::USD);
        let lot = state.lots.values_mut().next().unwrap();
        lot.dispatched_volume += dec!(1);

        let report = reconcile_state(&state).unwrap();
        assert!(report
            .divergences
            .iter()
            .any(|d| matches!(d, Divergence::ClientBalance(b) if b.currency == Currency::USD)));
        assert!(report.divergences.iter().any(|d| matches!(d, Divergence::LotFigures { .. })));
        assert!(report.divergences.iter().any(|d| matches!(d, Divergence::ShipmentRollup { .. })));
    }
}

// ============================================================================
// Properties
// ============================================================================

mod properties {
    use super::*;
    use proptest::prelude::*;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn volume_allocation_always_reconciles(
            volumes in lot_volumes_strategy(6),
            amount in positive_usd_strategy(),
        ) {
            runtime().block_on(async {
                let h = Harness::new();
                let operator = ActorFixtures::operator();
                let shipment = h
                    .service
                    .create_shipment(ShipmentBuilder::new().build(), &operator)
                    .await
                    .unwrap()
                    .value;
                for volume in &volumes {
                    h.service
                        .add_lot(shipment.id, LotBuilder::new().with_volume(*volume).build(), &operator)
                        .await
                        .unwrap();
                }
                let expense = h
                    .service
                    .record_expense(shipment.id, "freight", amount, DateFixtures::intake(), &operator)
                    .await
                    .unwrap()
                    .value;

                let allocations = h
                    .service
                    .allocate_expense(expense.id, Vec::new(), AllocationMethod::VolumeBased, false, &operator)
                    .await
                    .unwrap()
                    .value;
                assert_eq!(allocations.len(), volumes.len());
                assert_allocations_reconcile(&allocations, &amount);

                let state = h.service.snapshot().await;
                let allocated = Money::sum(
                    Currency::USD,
                    state.lots_of(shipment.id).map(|l| &l.allocated_expenses),
                )
                .unwrap();
                assert_eq!(allocated, amount);
                assert!(state
                    .lots_of(shipment.id)
                    .all(|l| !l.allocated_expenses.is_negative()));
                assert!(reconcile_state(&state).unwrap().is_consistent());
            });
        }

        #[test]
        fn expenses_land_in_base_currency(amount in positive_money_strategy()) {
            runtime().block_on(async {
                let h = Harness::new();
                let operator = ActorFixtures::operator();
                let shipment = h
                    .service
                    .create_shipment(ShipmentBuilder::new().build(), &operator)
                    .await
                    .unwrap()
                    .value;

                let expense = h
                    .service
                    .record_expense(shipment.id, "handling", amount, DateFixtures::intake(), &operator)
                    .await
                    .unwrap();
                assert!(expense.warnings.is_empty());

                let base = expense.value.base_amount();
                assert_eq!(base.currency(), Currency::USD);
                let expected = match amount.currency() {
                    Currency::USD => amount.amount(),
                    Currency::RUB => amount.amount() / dec!(90),
                };
                assert!((base.amount() - expected).abs() <= dec!(0.0001));
            });
        }
    }
}
