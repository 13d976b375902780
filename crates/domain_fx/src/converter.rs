//! Currency conversion with fallback policy
//!
//! Lookup order for a pair on a date:
//!
//! 1. the most recent rate effective on or before the date
//! 2. the most recent rate of any date
//! 3. `RateUnavailable`
//!
//! Each provider call is bounded by `lookup_timeout`; a timeout moves on to
//! the next step instead of blocking the caller.
//!
//! Valuation callers use [`CurrencyConverter::convert_for_valuation`], which
//! never fails: when step 3 is reached it applies the configured last-resort
//! constant and returns [`ValuationConversion::Degraded`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use core_kernel::{Currency, Money};

use crate::error::FxError;
use crate::provider::ExchangeRateProvider;
use crate::rate::{CurrencyPair, ExchangeRate};

/// Which lookup step supplied the rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateBasis {
    /// Same currency, rate 1
    Identity,
    /// Rate effective on or before the requested date
    Effective,
    /// Most recent rate of any date
    LatestAvailable,
}

/// Result of a successful conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub converted: Money,
    /// Multiplier from source to target currency
    pub rate_used: Decimal,
    pub rate_date: Option<NaiveDate>,
    pub basis: RateBasis,
}

impl Conversion {
    fn identity(amount: Money) -> Self {
        Self {
            converted: amount,
            rate_used: Decimal::ONE,
            rate_date: None,
            basis: RateBasis::Identity,
        }
    }

    fn from_rate(amount: &Money, to: Currency, rate: &ExchangeRate, basis: RateBasis) -> Option<Self> {
        Some(Self {
            converted: rate.convert(amount, to)?,
            rate_used: rate.factor(amount.currency(), to)?,
            rate_date: Some(rate.effective_date),
            basis,
        })
    }
}

/// Outcome of a conversion used for valuation
///
/// Stored on the entity it valued so a degraded figure is visible in state,
/// not only in logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValuationConversion {
    Converted {
        amount: Money,
        rate: Decimal,
        rate_date: Option<NaiveDate>,
    },
    Degraded {
        amount: Money,
        fallback_rate: Decimal,
        reason: String,
    },
}

impl ValuationConversion {
    /// Converted amount regardless of quality
    pub fn amount(&self) -> Money {
        match self {
            ValuationConversion::Converted { amount, .. } => *amount,
            ValuationConversion::Degraded { amount, .. } => *amount,
        }
    }

    /// The multiplier applied
    pub fn rate(&self) -> Decimal {
        match self {
            ValuationConversion::Converted { rate, .. } => *rate,
            ValuationConversion::Degraded { fallback_rate, .. } => *fallback_rate,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ValuationConversion::Degraded { .. })
    }

    /// An identity conversion for amounts already in the target currency
    pub fn identity(amount: Money) -> Self {
        ValuationConversion::Converted {
            amount,
            rate: Decimal::ONE,
            rate_date: None,
        }
    }
}

impl From<Conversion> for ValuationConversion {
    fn from(c: Conversion) -> Self {
        ValuationConversion::Converted {
            amount: c.converted,
            rate: c.rate_used,
            rate_date: c.rate_date,
        }
    }
}

impl fmt::Display for ValuationConversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValuationConversion::Converted { amount, rate, .. } => write!(f, "{} @ {}", amount, rate),
            ValuationConversion::Degraded { amount, fallback_rate, reason } => {
                write!(f, "{} @ {} (degraded: {})", amount, fallback_rate, reason)
            }
        }
    }
}

/// Currency conversion service
#[derive(Clone)]
pub struct CurrencyConverter {
    provider: Arc<dyn ExchangeRateProvider>,
    lookup_timeout: Duration,
    last_resort: Vec<ExchangeRate>,
}

impl fmt::Debug for CurrencyConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrencyConverter")
            .field("lookup_timeout", &self.lookup_timeout)
            .field("last_resort", &self.last_resort)
            .finish_non_exhaustive()
    }
}

impl CurrencyConverter {
    pub fn new(provider: Arc<dyn ExchangeRateProvider>, lookup_timeout: Duration) -> Self {
        Self {
            provider,
            lookup_timeout,
            last_resort: Vec::new(),
        }
    }

    /// Registers a last-resort constant for a pair, used only by valuation
    ///
    /// # Errors
    ///
    /// Returns `InvalidRate` unless the rate is strictly positive
    pub fn with_last_resort(mut self, pair: CurrencyPair, rate: Decimal) -> Result<Self, FxError> {
        let constant = ExchangeRate::new(pair, rate, NaiveDate::MIN)?.with_source("last-resort");
        self.last_resort.retain(|r| !r.pair.covers(pair.base, pair.quote));
        self.last_resort.push(constant);
        Ok(self)
    }

    /// Converts an amount into `to` as of a date
    ///
    /// # Errors
    ///
    /// Returns `RateUnavailable` when no rate exists for the pair at all
    /// (or the provider could not answer within the timeout).
    pub async fn convert(&self, amount: Money, to: Currency, as_of: NaiveDate) -> Result<Conversion, FxError> {
        let from = amount.currency();
        if from == to {
            return Ok(Conversion::identity(amount));
        }

        let pair = CurrencyPair::new(from, to);
        let unavailable = || FxError::RateUnavailable { from, to, as_of };

        if let Some(rate) = self.lookup(pair, Some(as_of)).await {
            debug!(%pair, %as_of, rate = %rate.rate, rate_date = %rate.effective_date, "effective rate found");
            return Conversion::from_rate(&amount, to, &rate, RateBasis::Effective).ok_or_else(unavailable);
        }

        if let Some(rate) = self.lookup(pair, None).await {
            debug!(%pair, %as_of, rate = %rate.rate, rate_date = %rate.effective_date, "falling back to latest rate");
            return Conversion::from_rate(&amount, to, &rate, RateBasis::LatestAvailable).ok_or_else(unavailable);
        }

        Err(unavailable())
    }

    /// Converts for valuation purposes; never fails
    pub async fn convert_for_valuation(&self, amount: Money, to: Currency, as_of: NaiveDate) -> ValuationConversion {
        match self.convert(amount, to, as_of).await {
            Ok(conversion) => conversion.into(),
            Err(err) => self.degrade(amount, to, err.to_string()),
        }
    }

    /// Applies the last-resort constant, or an identity rate when none is configured
    pub fn degrade(&self, amount: Money, to: Currency, reason: String) -> ValuationConversion {
        let from = amount.currency();
        let constant = self.last_resort.iter().find(|r| r.pair.covers(from, to));

        let (converted, fallback_rate, reason) = match constant {
            Some(rate) => match (rate.convert(&amount, to), rate.factor(from, to)) {
                (Some(converted), Some(factor)) => (converted, factor, reason),
                _ => (Money::new(amount.amount(), to), Decimal::ONE, reason),
            },
            None => (
                Money::new(amount.amount(), to),
                Decimal::ONE,
                format!("{}; no last-resort rate configured for {}/{}", reason, from, to),
            ),
        };

        warn!(
            from = %from,
            to = %to,
            fallback_rate = %fallback_rate,
            reason = %reason,
            "valuation degraded to last-resort rate"
        );

        ValuationConversion::Degraded {
            amount: converted,
            fallback_rate,
            reason,
        }
    }

    async fn lookup(&self, pair: CurrencyPair, as_of: Option<NaiveDate>) -> Option<ExchangeRate> {
        let call = async {
            match as_of {
                Some(date) => self.provider.get_rate(pair, date).await,
                None => self.provider.latest_rate(pair).await,
            }
        };

        match tokio::time::timeout(self.lookup_timeout, call).await {
            Ok(Ok(rate)) => Some(rate),
            Ok(Err(err)) if err.is_not_found() => None,
            Ok(Err(err)) => {
                warn!(%pair, error = %err, "rate provider failed");
                None
            }
            Err(_) => {
                warn!(%pair, timeout_ms = (self.lookup_timeout.as_millis() as u64), "rate lookup timed out");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::InMemoryRateStore;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn converter_with_rate(rate: Decimal, on: NaiveDate) -> CurrencyConverter {
        let store = InMemoryRateStore::new();
        store
            .insert(ExchangeRate::new(CurrencyPair::new(Currency::USD, Currency::RUB), rate, on).unwrap())
            .await;
        CurrencyConverter::new(Arc::new(store), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_same_currency_is_identity() {
        let converter = CurrencyConverter::new(Arc::new(InMemoryRateStore::new()), Duration::from_millis(50));
        let amount = Money::new(dec!(900), Currency::USD);
        let result = converter.convert(amount, Currency::USD, date(2024, 3, 1)).await.unwrap();
        assert_eq!(result.converted, amount);
        assert_eq!(result.rate_used, Decimal::ONE);
        assert_eq!(result.basis, RateBasis::Identity);
    }

    #[tokio::test]
    async fn test_falls_back_to_latest_rate_of_any_date() {
        let converter = converter_with_rate(dec!(90), date(2024, 6, 1)).await;
        let result = converter
            .convert(Money::new(dec!(50000), Currency::RUB), Currency::USD, date(2024, 1, 1))
            .await
            .unwrap();
        assert_eq!(result.basis, RateBasis::LatestAvailable);
        assert_eq!(result.converted.amount(), dec!(555.5556));
        assert_eq!(result.rate_date, Some(date(2024, 6, 1)));
    }

    #[tokio::test]
    async fn test_valuation_degrades_without_constant() {
        let converter = CurrencyConverter::new(Arc::new(InMemoryRateStore::new()), Duration::from_millis(50));
        let result = converter
            .convert_for_valuation(Money::new(dec!(100), Currency::RUB), Currency::USD, date(2024, 1, 1))
            .await;
        assert!(result.is_degraded());
        assert_eq!(result.rate(), Decimal::ONE);
        assert_eq!(result.amount().currency(), Currency::USD);
    }

    #[tokio::test]
    async fn test_timeout_falls_through_to_last_resort() {
        use crate::provider::mock::SlowRateProvider;

        let store = InMemoryRateStore::new();
        store
            .insert(ExchangeRate::new(CurrencyPair::new(Currency::USD, Currency::RUB), dec!(80), date(2024, 1, 1)).unwrap())
            .await;
        let slow = SlowRateProvider::new(store, Duration::from_millis(500));
        let converter = CurrencyConverter::new(Arc::new(slow), Duration::from_millis(20))
            .with_last_resort(CurrencyPair::new(Currency::USD, Currency::RUB), dec!(90))
            .unwrap();

        let amount = Money::new(dec!(50000), Currency::RUB);
        assert!(matches!(
            converter.convert(amount, Currency::USD, date(2024, 3, 1)).await,
            Err(FxError::RateUnavailable { .. })
        ));

        let valued = converter.convert_for_valuation(amount, Currency::USD, date(2024, 3, 1)).await;
        assert!(valued.is_degraded());
        assert_eq!(valued.amount().amount(), dec!(555.5556));
    }

    #[tokio::test]
    async fn test_provider_outage_is_treated_as_missing_rate() {
        use crate::provider::mock::UnavailableRateProvider;

        let converter = CurrencyConverter::new(Arc::new(UnavailableRateProvider), Duration::from_millis(50));
        let err = converter
            .convert(Money::new(dec!(10), Currency::USD), Currency::RUB, date(2024, 3, 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), core_kernel::ErrorKind::Conversion);
    }
}
