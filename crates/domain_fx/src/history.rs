//! Rate history lookups

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use core_kernel::Currency;
use crate::rate::ExchangeRate;

/// Time-indexed rates for all pairs, kept sorted by effective date
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateHistory {
    rates: Vec<ExchangeRate>,
}

impl RateHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rate record
    pub fn add(&mut self, rate: ExchangeRate) {
        self.rates.push(rate);
        self.rates.sort_by(|a, b| {
            a.effective_date
                .cmp(&b.effective_date)
                .then(a.created_at.cmp(&b.created_at))
        });
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Most recent rate between the two currencies effective on or before `as_of`
    pub fn effective_on(&self, from: Currency, to: Currency, as_of: NaiveDate) -> Option<&ExchangeRate> {
        self.rates
            .iter()
            .rev()
            .find(|r| r.pair.covers(from, to) && r.effective_date <= as_of)
    }

    /// Most recent rate between the two currencies regardless of date
    pub fn latest(&self, from: Currency, to: Currency) -> Option<&ExchangeRate> {
        self.rates.iter().rev().find(|r| r.pair.covers(from, to))
    }
}
