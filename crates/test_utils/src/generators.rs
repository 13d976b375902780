//! proptest strategies for amounts and volumes
//!
//! Volumes carry litre precision and amounts carry cents, matching what the
//! ledger accepts from operators.

use core_kernel::{Currency, Money};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for the supported currencies
pub fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![Just(Currency::USD), Just(Currency::RUB)]
}

/// Strategy for a positive volume with litre precision, up to 1,000 m³
pub fn volume_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000i64).prop_map(|litres| Decimal::new(litres, 3))
}

/// Strategy for a set of lot volumes sharing one shipment
pub fn lot_volumes_strategy(max_lots: usize) -> impl Strategy<Value = Vec<Decimal>> {
    prop::collection::vec(volume_strategy(), 1..=max_lots)
}

/// Strategy for a positive USD amount in cents
pub fn positive_usd_strategy() -> impl Strategy<Value = Money> {
    (1i64..100_000_000i64).prop_map(|cents| Money::new(Decimal::new(cents, 2), Currency::USD))
}

/// Strategy for a positive amount in either currency
pub fn positive_money_strategy() -> impl Strategy<Value = Money> {
    (1i64..100_000_000i64, currency_strategy())
        .prop_map(|(cents, currency)| Money::new(Decimal::new(cents, 2), currency))
}
