//! Exchange rates and currency pairs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{Currency, Money, RateId};
use crate::error::FxError;

/// An ordered currency pair; a rate on `USD/RUB` of 90 means 1 USD = 90 RUB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub base: Currency,
    pub quote: Currency,
}

impl CurrencyPair {
    pub fn new(base: Currency, quote: Currency) -> Self {
        Self { base, quote }
    }

    /// Returns the pair with base and quote swapped
    pub fn inverse(&self) -> Self {
        Self {
            base: self.quote,
            quote: self.base,
        }
    }

    /// True when both sides are the same currency
    pub fn is_identity(&self) -> bool {
        self.base == self.quote
    }

    /// True if this pair covers a conversion between `a` and `b` in either direction
    pub fn covers(&self, a: Currency, b: Currency) -> bool {
        (self.base == a && self.quote == b) || (self.base == b && self.quote == a)
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// A rate effective from a given date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub id: RateId,
    pub pair: CurrencyPair,
    /// Units of quote currency per one unit of base currency
    pub rate: Decimal,
    pub effective_date: NaiveDate,
    /// Where the rate came from (central bank feed, manual entry, ...)
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExchangeRate {
    /// Creates a new rate
    ///
    /// # Errors
    ///
    /// Returns `InvalidRate` unless the rate is strictly positive
    pub fn new(pair: CurrencyPair, rate: Decimal, effective_date: NaiveDate) -> Result<Self, FxError> {
        if rate <= Decimal::ZERO {
            return Err(FxError::InvalidRate {
                pair: pair.to_string(),
                rate,
            });
        }
        Ok(Self {
            id: RateId::new(),
            pair,
            rate,
            effective_date,
            source: None,
            created_at: Utc::now(),
        })
    }

    /// Sets the source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Multiplier that turns an amount in `from` into an amount in `to`
    pub fn factor(&self, from: Currency, to: Currency) -> Option<Decimal> {
        if from == self.pair.base && to == self.pair.quote {
            Some(self.rate)
        } else if from == self.pair.quote && to == self.pair.base {
            Some(Decimal::ONE / self.rate)
        } else {
            None
        }
    }

    /// Converts an amount with this rate
    ///
    /// Inverse conversions divide rather than multiply by a rounded
    /// reciprocal, so 50,000 RUB at 90 yields exactly 555.5556 USD.
    pub fn convert(&self, amount: &Money, to: Currency) -> Option<Money> {
        let from = amount.currency();
        if from == self.pair.base && to == self.pair.quote {
            Some(Money::new(amount.amount() * self.rate, to))
        } else if from == self.pair.quote && to == self.pair.base {
            Some(Money::new(amount.amount() / self.rate, to))
        } else {
            None
        }
    }
}
