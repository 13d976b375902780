//! Monetary amounts and liability shares
//!
//! Amounts are `rust_decimal::Decimal` held at four decimal places, enough
//! for per-m³ costs and converted prices to survive a round trip without
//! drift. Two-decimal rounding happens only when an amount is split into
//! shares or displayed.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;
use std::str::FromStr;
use thiserror::Error;

/// Internal precision of every [`Money`] amount
const AMOUNT_SCALE: u32 = 4;

/// Currencies the ledger trades in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    USD,
    RUB,
}

impl Currency {
    /// Decimal places shown and used for allocation shares
    pub fn decimal_places(&self) -> u32 {
        2
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::USD => "$",
            Currency::RUB => "₽",
        }
    }

    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::RUB => "RUB",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::USD),
            "RUB" => Ok(Currency::RUB),
            other => Err(MoneyError::UnknownCurrency(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Currency mismatch: cannot combine {0} with {1}")]
    CurrencyMismatch(String, String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Division by zero")]
    DivisionByZero,
}

/// An amount tagged with its currency
///
/// Arithmetic between two amounts is checked: mixing currencies is an
/// error, never an implicit conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Rounds `amount` to the internal scale
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self {
            amount: amount.round_dp(AMOUNT_SCALE),
            currency,
        }
    }

    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Strictly greater than zero
    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    /// Strictly less than zero
    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    pub fn abs(&self) -> Self {
        Self::new(self.amount.abs(), self.currency)
    }

    /// Clamps credit to zero, as when showing what a client still owes
    pub fn floor_zero(&self) -> Self {
        if self.is_negative() {
            Self::zero(self.currency)
        } else {
            *self
        }
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.same_currency(other)?;
        Ok(Self::new(self.amount + other.amount, self.currency))
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.same_currency(other)?;
        Ok(Self::new(self.amount - other.amount, self.currency))
    }

    /// Scales by a volume, a rate or a fraction
    pub fn multiply(&self, factor: Decimal) -> Self {
        Self::new(self.amount * factor, self.currency)
    }

    pub fn divide(&self, divisor: Decimal) -> Result<Self, MoneyError> {
        if divisor.is_zero() {
            return Err(MoneyError::DivisionByZero);
        }
        Ok(Self::new(self.amount / divisor, self.currency))
    }

    /// Totals `items`, all of which must be in `currency`
    pub fn sum<'a>(
        currency: Currency,
        items: impl IntoIterator<Item = &'a Money>,
    ) -> Result<Money, MoneyError> {
        items
            .into_iter()
            .try_fold(Money::zero(currency), |total, m| total.checked_add(m))
    }

    /// Splits the amount into shares proportional to `ratios`
    ///
    /// Shares come back in ratio order. Each share is first truncated to the
    /// currency's decimal places, then the leftover units go one at a time to
    /// the shares with the largest truncated fraction, later shares winning
    /// ties. Any sub-unit residue joins the share that received the last
    /// unit. Every share carries the sign of `self` and the shares add back
    /// up to `self` exactly.
    pub fn allocate_by_ratios(&self, ratios: &[Decimal]) -> Result<Vec<Money>, MoneyError> {
        if ratios.is_empty() {
            return Err(MoneyError::InvalidAmount("no ratios to split by".to_string()));
        }
        if let Some(negative) = ratios.iter().find(|r| r.is_sign_negative() && !r.is_zero()) {
            return Err(MoneyError::InvalidAmount(format!("negative ratio {}", negative)));
        }
        let total: Decimal = ratios.iter().sum();
        if total.is_zero() {
            return Err(MoneyError::InvalidAmount("ratios sum to zero".to_string()));
        }

        let places = self.currency.decimal_places();
        let unit = Decimal::new(1, places);
        let magnitude = self.amount.abs();

        let mut floors = Vec::with_capacity(ratios.len());
        let mut fractions = Vec::with_capacity(ratios.len());
        for ratio in ratios {
            let exact = magnitude * *ratio / total;
            let floor = exact.round_dp_with_strategy(places, RoundingStrategy::ToZero);
            fractions.push(exact - floor);
            floors.push(floor);
        }

        let mut leftover = magnitude - floors.iter().copied().sum::<Decimal>();
        let mut order: Vec<usize> = (0..ratios.len()).collect();
        order.sort_by(|a, b| fractions[*b].cmp(&fractions[*a]).then(b.cmp(a)));

        let mut last_bumped = order[0];
        for index in order {
            if leftover < unit {
                break;
            }
            floors[index] += unit;
            leftover -= unit;
            last_bumped = index;
        }
        floors[last_bumped] += leftover;

        let sign = if self.is_negative() { -Decimal::ONE } else { Decimal::ONE };
        Ok(floors
            .into_iter()
            .map(|share| Self::new(share * sign, self.currency))
            .collect())
    }

    fn same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(MoneyError::CurrencyMismatch(
                self.currency.to_string(),
                other.currency.to_string(),
            ))
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let places = self.currency.decimal_places() as usize;
        write!(f, "{} {:.places$}", self.currency.symbol(), self.amount)
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.amount, self.currency)
    }
}

/// A share expressed as a fraction of one, such as a liable percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    value: Decimal,
}

impl Rate {
    /// `50` means half
    pub fn from_percentage(percentage: Decimal) -> Self {
        Self {
            value: percentage / dec!(100),
        }
    }

    pub fn full() -> Self {
        Self { value: Decimal::ONE }
    }

    pub fn as_percentage(&self) -> Decimal {
        self.value * dec!(100)
    }

    pub fn apply(&self, money: &Money) -> Money {
        money.multiply(self.value)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage().round_dp(4).normalize())
    }
}
