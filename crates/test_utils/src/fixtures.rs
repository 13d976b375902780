//! Pre-built Test Fixtures
//!
//! Ready-to-use values shared by the ledger test suites. They mirror the
//! worked scenarios: a 100 m³ lot bought for 50,000 RUB at 90 RUB/USD.

use chrono::NaiveDate;
use core_kernel::{Actor, Currency, Money, Role};
use domain_fx::{CurrencyPair, ExchangeRate, RateHistory};
use rust_decimal_macros::dec;

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// Purchase price of the scenario lot
    pub fn rub_purchase() -> Money {
        Money::new(dec!(50000), Currency::RUB)
    }

    /// Shared expense allocated in the scenarios
    pub fn usd_expense() -> Money {
        Money::new(dec!(900), Currency::USD)
    }

    pub fn usd(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::USD)
    }

    pub fn rub(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::RUB)
    }
}

/// Fixture for dates
pub struct DateFixtures;

impl DateFixtures {
    /// Shipment intake date
    pub fn intake() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
    }

    /// First sale date, one day after intake
    pub fn sale() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 2).unwrap()
    }

    /// Date used for later corrections such as reversals
    pub fn correction() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 10).unwrap()
    }

    /// A date before any rate was published
    pub fn before_rates() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
    }
}

/// Fixture for actors in each role
pub struct ActorFixtures;

impl ActorFixtures {
    pub fn operator() -> Actor {
        Actor::new("operator-1", [Role::Operator])
    }

    pub fn accountant() -> Actor {
        Actor::new("accountant-1", [Role::Accountant])
    }

    pub fn manager() -> Actor {
        Actor::new("manager-1", [Role::Manager])
    }

    pub fn admin() -> Actor {
        Actor::new("admin-1", [Role::Admin])
    }
}

/// Fixture for exchange rates
pub struct RateFixtures;

impl RateFixtures {
    pub fn usd_rub() -> CurrencyPair {
        CurrencyPair::new(Currency::USD, Currency::RUB)
    }

    /// 1 USD = 90 RUB, effective at intake
    pub fn usd_rub_90() -> ExchangeRate {
        ExchangeRate::new(Self::usd_rub(), dec!(90), DateFixtures::intake()).unwrap()
    }

    /// History holding only [`RateFixtures::usd_rub_90`]
    pub fn history() -> RateHistory {
        let mut history = RateHistory::new();
        history.add(Self::usd_rub_90());
        history
    }
}
