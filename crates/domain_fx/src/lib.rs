//! Currency Conversion Domain
//!
//! Converts amounts between the two supported currencies using a
//! time-indexed rate history:
//!
//! - **Rates**: [`ExchangeRate`] records on a [`CurrencyPair`], effective from a date
//! - **History**: [`RateHistory`] answers "which rate applied on this date"
//! - **Provider port**: [`ExchangeRateProvider`], with an in-memory adapter
//! - **Converter**: [`CurrencyConverter`] applies the lookup and fallback policy
//!   and produces a tagged [`ValuationConversion`] for valuation callers

pub mod converter;
pub mod error;
pub mod history;
pub mod provider;
pub mod rate;

pub use converter::{Conversion, CurrencyConverter, RateBasis, ValuationConversion};
pub use error::FxError;
pub use history::RateHistory;
pub use provider::{ExchangeRateProvider, InMemoryRateStore};
pub use rate::{CurrencyPair, ExchangeRate};
