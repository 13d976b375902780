//! Currency conversion errors

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{Currency, ErrorKind};

/// Errors that can occur while converting between currencies
#[derive(Debug, Error)]
pub enum FxError {
    /// No rate for the pair on or before the date, and none at all as fallback
    #[error("No exchange rate available for {from}/{to} as of {as_of}")]
    RateUnavailable {
        from: Currency,
        to: Currency,
        as_of: NaiveDate,
    },

    /// A rate must be strictly positive
    #[error("Invalid exchange rate {rate} for {pair}")]
    InvalidRate { pair: String, rate: Decimal },
}

impl FxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FxError::RateUnavailable { .. } => ErrorKind::Conversion,
            FxError::InvalidRate { .. } => ErrorKind::Validation,
        }
    }
}
