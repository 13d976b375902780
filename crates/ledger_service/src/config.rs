//! Service configuration

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use core_kernel::Currency;
use domain_fx::CurrencyPair;
use domain_inventory::LifecyclePolicy;

/// Service configuration, read from `LEDGER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Valuation and reporting currency
    pub base_currency: Currency,
    /// Dispatched/total fraction at which a shipment auto-closes
    pub auto_close_threshold: Decimal,
    /// Remaining volume at or below which a shipment auto-closes
    pub min_remaining_volume: Decimal,
    /// Bound on each rate-provider call
    pub rate_lookup_timeout_ms: u64,
    /// RUB per USD used when no rate can be found for a valuation
    pub last_resort_rate: Decimal,
    /// Internal retries on an optimistic-lock conflict
    pub conflict_retries: u32,
    /// Log level
    pub log_level: String,
    /// Emit JSON log lines
    pub log_json: bool,
    /// Ledger snapshot read by `ledger-reconcile`
    pub snapshot_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_currency: Currency::USD,
            auto_close_threshold: dec!(1.0),
            min_remaining_volume: dec!(0.5),
            rate_lookup_timeout_ms: 2000,
            last_resort_rate: dec!(90),
            conflict_retries: 1,
            log_level: "info".to_string(),
            log_json: false,
            snapshot_path: None,
        }
    }
}

impl ServiceConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("LEDGER").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn lifecycle_policy(&self) -> LifecyclePolicy {
        LifecyclePolicy {
            auto_close_threshold: self.auto_close_threshold,
            min_remaining_volume: self.min_remaining_volume,
        }
    }

    pub fn rate_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.rate_lookup_timeout_ms)
    }

    /// Pair the last-resort constant is quoted in
    pub fn last_resort_pair(&self) -> CurrencyPair {
        CurrencyPair::new(Currency::USD, Currency::RUB)
    }
}
