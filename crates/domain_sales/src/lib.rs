//! Sales Domain
//!
//! A sale releases accepted volume (sent minus transit loss) from one lot to
//! one client. This crate validates dispatch requests and models the
//! resulting [`SaleEvent`] and its payment state; the transactional effects
//! on lots, the cash ledger and client balances are orchestrated by the
//! application service.

pub mod error;
pub mod sale;

pub use error::SalesError;
pub use sale::{DispatchRequest, PaymentState, SaleEvent};
