//! Exchange rate provider port
//!
//! The ledger never owns rate data; it asks a provider for the rate that was
//! effective on a given date. Adapters may be backed by a central bank feed,
//! a database table, or the in-memory history used by the service snapshot.
//!
//! ```rust,ignore
//! let provider: Arc<dyn ExchangeRateProvider> = Arc::new(InMemoryRateStore::new());
//! let rate = provider.get_rate(CurrencyPair::new(Currency::USD, Currency::RUB), as_of).await?;
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use core_kernel::{DomainPort, PortError};

use crate::history::RateHistory;
use crate::rate::{CurrencyPair, ExchangeRate};

/// Source of historical exchange rates
///
/// A returned rate may be quoted in either orientation of the requested pair;
/// callers use [`ExchangeRate::convert`] which handles both.
#[async_trait]
pub trait ExchangeRateProvider: DomainPort {
    /// Rate effective on or before `as_of`, or `PortError::NotFound`
    async fn get_rate(&self, pair: CurrencyPair, as_of: NaiveDate) -> Result<ExchangeRate, PortError>;

    /// Most recent rate for the pair regardless of date
    async fn latest_rate(&self, pair: CurrencyPair) -> Result<ExchangeRate, PortError>;
}

/// Rate history held in process memory
#[derive(Debug, Default)]
pub struct InMemoryRateStore {
    history: RwLock<RateHistory>,
}

impl InMemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store from an existing history
    pub fn from_history(history: RateHistory) -> Self {
        Self {
            history: RwLock::new(history),
        }
    }

    /// Records a rate
    pub async fn insert(&self, rate: ExchangeRate) {
        self.history.write().await.add(rate);
    }

    /// Copy of the full history, used for snapshots
    pub async fn history(&self) -> RateHistory {
        self.history.read().await.clone()
    }
}

impl DomainPort for InMemoryRateStore {}

#[async_trait]
impl ExchangeRateProvider for InMemoryRateStore {
    async fn get_rate(&self, pair: CurrencyPair, as_of: NaiveDate) -> Result<ExchangeRate, PortError> {
        self.history
            .read()
            .await
            .effective_on(pair.base, pair.quote, as_of)
            .cloned()
            .ok_or_else(|| PortError::not_found("ExchangeRate", format!("{} as of {}", pair, as_of)))
    }

    async fn latest_rate(&self, pair: CurrencyPair) -> Result<ExchangeRate, PortError> {
        self.history
            .read()
            .await
            .latest(pair.base, pair.quote)
            .cloned()
            .ok_or_else(|| PortError::not_found("ExchangeRate", pair))
    }
}

/// Providers that misbehave on purpose
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::time::Duration;

    /// Sleeps before answering from its inner store
    #[derive(Debug)]
    pub struct SlowRateProvider {
        inner: InMemoryRateStore,
        delay: Duration,
    }

    impl SlowRateProvider {
        pub fn new(inner: InMemoryRateStore, delay: Duration) -> Self {
            Self { inner, delay }
        }
    }

    impl DomainPort for SlowRateProvider {}

    #[async_trait]
    impl ExchangeRateProvider for SlowRateProvider {
        async fn get_rate(&self, pair: CurrencyPair, as_of: NaiveDate) -> Result<ExchangeRate, PortError> {
            tokio::time::sleep(self.delay).await;
            self.inner.get_rate(pair, as_of).await
        }

        async fn latest_rate(&self, pair: CurrencyPair) -> Result<ExchangeRate, PortError> {
            tokio::time::sleep(self.delay).await;
            self.inner.latest_rate(pair).await
        }
    }

    /// Always reports the rate service as unavailable
    #[derive(Debug, Default)]
    pub struct UnavailableRateProvider;

    impl DomainPort for UnavailableRateProvider {}

    #[async_trait]
    impl ExchangeRateProvider for UnavailableRateProvider {
        async fn get_rate(&self, _pair: CurrencyPair, _as_of: NaiveDate) -> Result<ExchangeRate, PortError> {
            Err(PortError::ServiceUnavailable {
                service: "rate-history".to_string(),
            })
        }

        async fn latest_rate(&self, _pair: CurrencyPair) -> Result<ExchangeRate, PortError> {
            Err(PortError::ServiceUnavailable {
                service: "rate-history".to_string(),
            })
        }
    }
}
