//! Tests for lot valuation, expense allocation and shipment rollups

use chrono::NaiveDate;
use core_kernel::{Actor, Currency, ExpenseId, Money, ShipmentId};
use domain_fx::ValuationConversion;
use domain_inventory::{
    allocate, allocation, valuation, AllocationMethod, LifecyclePolicy, Lot, NewLot, NewShipment,
    ReasonCode, Route, Shipment, ShipmentState, ShipmentTotals, ALLOCATION_TOLERANCE,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn rub_lot(shipment: ShipmentId, volume: Decimal, rub: Decimal) -> Lot {
    Lot::new(
        shipment,
        NewLot {
            name: "birch".to_string(),
            quantity: 10,
            total_volume: volume,
            purchase_amount: Money::new(rub, Currency::RUB),
        },
        ValuationConversion::Converted {
            amount: Money::new(rub / dec!(90), Currency::USD),
            rate: Decimal::ONE / dec!(90),
            rate_date: NaiveDate::from_ymd_opt(2024, 3, 1),
        },
    )
    .unwrap()
}

fn shipment() -> Shipment {
    Shipment::new(
        NewShipment {
            code: "W-7".to_string(),
            intake_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            route: Route {
                origin: "Irkutsk".to_string(),
                destination: "Almaty".to_string(),
            },
        },
        Currency::USD,
    )
    .unwrap()
}

mod scenario_a {
    use super::*;

    #[test]
    fn test_expense_allocated_by_volume_raises_unit_cost() {
        let shipment = ShipmentId::new();
        let mut lot = rub_lot(shipment, dec!(100), dec!(50000));
        assert_eq!(lot.figures.unit_cost.amount(), dec!(5.5556));

        let allocations = allocate(
            ExpenseId::new(),
            Money::new(dec!(900), Currency::USD),
            &[&lot],
            AllocationMethod::VolumeBased,
        )
        .unwrap();
        assert_eq!(allocations[0].percentage, dec!(100));
        assert_eq!(allocations[0].amount.amount(), dec!(900));

        lot.apply_allocation(&allocations[0]).unwrap();
        assert_eq!(lot.figures.investment.amount(), dec!(1455.5556));
        assert!((lot.figures.unit_cost.amount() - dec!(14.56)).abs() < dec!(0.01));
    }

    #[test]
    fn test_realized_profit_after_partial_dispatch() {
        let shipment = ShipmentId::new();
        let mut lot = rub_lot(shipment, dec!(100), dec!(50000));
        let allocations = allocate(
            ExpenseId::new(),
            Money::new(dec!(900), Currency::USD),
            &[&lot],
            AllocationMethod::VolumeBased,
        )
        .unwrap();
        lot.apply_allocation(&allocations[0]).unwrap();

        lot.record_dispatch(dec!(30), Money::new(dec!(600), Currency::USD)).unwrap();
        assert_eq!(lot.remaining_volume(), dec!(70));
        assert!((lot.figures.realized_profit.amount() - dec!(163.33)).abs() < dec!(0.01));
    }
}

mod rollup {
    use super::*;

    #[test]
    fn test_rollup_sums_lot_volumes_and_skips_deleted() {
        let mut shipment = shipment();
        let mut a = rub_lot(shipment.id, dec!(60), dec!(9000));
        let b = rub_lot(shipment.id, dec!(40), dec!(9000));
        let mut gone = rub_lot(shipment.id, dec!(500), dec!(9000));
        gone.soft_delete();

        a.record_dispatch(dec!(20), Money::new(dec!(200), Currency::USD)).unwrap();
        shipment.apply_rollup([&a, &b, &gone]).unwrap();

        assert_eq!(shipment.totals.lot_count, 2);
        assert_eq!(shipment.totals.total_volume, dec!(100));
        assert_eq!(shipment.totals.dispatched_volume, dec!(20));
        assert_eq!(shipment.totals.remaining_volume, dec!(80));
        assert_eq!(shipment.totals.revenue.amount(), dec!(200));
        assert_eq!(
            shipment.totals.purchases_by_currency[&Currency::RUB].amount(),
            dec!(18000)
        );
    }

    #[test]
    fn test_fully_sold_shipment_auto_closes() {
        let mut shipment = shipment();
        let mut lot = rub_lot(shipment.id, dec!(10), dec!(900));
        lot.record_dispatch(dec!(10), Money::new(dec!(150), Currency::USD)).unwrap();
        shipment.apply_rollup([&lot]).unwrap();

        let reason = shipment.evaluate_auto_close(&LifecyclePolicy::default()).unwrap();
        assert_eq!(reason, Some(ReasonCode::FullySold));
        assert_eq!(shipment.state, ShipmentState::Closed);
        assert_eq!(shipment.transitions[0].actor, Actor::system().id);
    }

    #[test]
    fn test_small_remainder_auto_closes() {
        let mut shipment = shipment();
        let mut lot = rub_lot(shipment.id, dec!(10), dec!(900));
        lot.record_dispatch(dec!(9.6), Money::new(dec!(150), Currency::USD)).unwrap();
        shipment.apply_rollup([&lot]).unwrap();

        let reason = shipment.evaluate_auto_close(&LifecyclePolicy::default()).unwrap();
        assert_eq!(reason, Some(ReasonCode::RemainingTooSmall));
    }

    #[test]
    fn test_untouched_shipment_does_not_auto_close() {
        let mut shipment = shipment();
        let lot = rub_lot(shipment.id, dec!(0.2), dec!(900));
        shipment.apply_rollup([&lot]).unwrap();
        assert_eq!(shipment.evaluate_auto_close(&LifecyclePolicy::default()).unwrap(), None);
        assert_eq!(shipment.state, ShipmentState::Active);
    }

    #[test]
    fn test_empty_rollup() {
        let totals = ShipmentTotals::rollup(Currency::USD, std::iter::empty()).unwrap();
        assert_eq!(totals, ShipmentTotals::empty(Currency::USD));
    }
}

mod properties {
    use super::*;

    fn volume() -> impl Strategy<Value = Decimal> {
        (1i64..100_000).prop_map(|v| Decimal::new(v, 3))
    }

    proptest! {
        #[test]
        fn allocations_sum_to_expense(
            volumes in prop::collection::vec(volume(), 1..8),
            cents in 1i64..10_000_000,
            method in prop_oneof![
                Just(AllocationMethod::VolumeBased),
                Just(AllocationMethod::ValueBased),
                Just(AllocationMethod::EqualSplit),
            ],
        ) {
            let shipment = ShipmentId::new();
            let lots: Vec<Lot> = volumes.iter().map(|v| rub_lot(shipment, *v, *v * dec!(900))).collect();
            let refs: Vec<&Lot> = lots.iter().collect();
            let expense = Money::new(Decimal::new(cents, 2), Currency::USD);
            let expense_id = ExpenseId::new();

            let result = allocate(expense_id, expense, &refs, method).unwrap();

            let pct: Decimal = result.iter().map(|a| a.percentage).sum();
            let total: Decimal = result.iter().map(|a| a.amount.amount()).sum();
            prop_assert!((pct - dec!(100)).abs() <= ALLOCATION_TOLERANCE);
            prop_assert!((total - expense.amount()).abs() <= ALLOCATION_TOLERANCE);
            prop_assert!(allocation::verify(expense_id, &expense, &result).is_ok());
        }

        #[test]
        fn volumes_are_conserved(
            total in 1i64..10_000,
            loss in 0i64..10_000,
            sold in 0i64..10_000,
        ) {
            let mut lot = rub_lot(ShipmentId::new(), Decimal::from(total), dec!(9000));
            let _ = lot.record_loss(Decimal::from(loss));
            let _ = lot.record_dispatch(Decimal::from(sold), Money::new(dec!(1), Currency::USD));

            prop_assert_eq!(lot.available_volume(), lot.total_volume - lot.loss_volume);
            prop_assert_eq!(lot.remaining_volume(), lot.available_volume() - lot.dispatched_volume);
            prop_assert!(lot.remaining_volume() >= Decimal::ZERO);
            prop_assert!(lot.check_invariants().is_ok());
        }

        #[test]
        fn recompute_is_bit_identical(sold in 0i64..100, expense in 0i64..100_000) {
            let shipment = ShipmentId::new();
            let mut lot = rub_lot(shipment, dec!(100), dec!(50000));
            if expense > 0 {
                let allocations = allocate(ExpenseId::new(), Money::new(Decimal::new(expense, 2), Currency::USD), &[&lot], AllocationMethod::VolumeBased).unwrap();
                lot.apply_allocation(&allocations[0]).unwrap();
            }
            lot.record_dispatch(Decimal::from(sold), Money::new(Decimal::from(sold * 20), Currency::USD)).unwrap();

            let again = valuation::recompute(&lot).unwrap();
            prop_assert_eq!(&again.figures, &lot.figures);
            prop_assert_eq!(again.figures.available_volume.serialize(), lot.figures.available_volume.serialize());
            prop_assert_eq!(again.figures.unit_cost.amount().serialize(), lot.figures.unit_cost.amount().serialize());
        }
    }
}
