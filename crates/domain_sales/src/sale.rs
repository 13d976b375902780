//! Sale/dispatch events

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{round_volume, Actor, ClientId, Currency, LotId, Money, SaleId, ShipmentId};
use domain_fx::ValuationConversion;
use domain_inventory::{InventoryError, Lot};

use crate::error::SalesError;

/// Payment state derived from the outstanding debt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Unpaid,
    Partial,
    Paid,
}

impl PaymentState {
    pub fn derive(total: &Money, paid: &Money) -> Self {
        if paid.amount() >= total.amount() {
            PaymentState::Paid
        } else if paid.is_zero() {
            PaymentState::Unpaid
        } else {
            PaymentState::Partial
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentState::Unpaid => "unpaid",
            PaymentState::Partial => "partial",
            PaymentState::Paid => "paid",
        };
        f.write_str(name)
    }
}

/// Caller input for a dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub lot_id: LotId,
    pub client_id: ClientId,
    pub sent_volume: Decimal,
    pub transit_loss_volume: Decimal,
    pub unit_price: Decimal,
    pub currency: Currency,
    pub paid_amount: Decimal,
    pub sale_date: NaiveDate,
    pub notes: Option<String>,
}

impl DispatchRequest {
    /// Sent minus transit loss
    pub fn accepted_volume(&self) -> Decimal {
        round_volume(self.sent_volume - self.transit_loss_volume)
    }

    /// Accepted volume × unit price
    pub fn total_price(&self) -> Money {
        Money::new(self.accepted_volume() * self.unit_price, self.currency)
    }

    /// Checks every precondition that does not need the lot
    ///
    /// # Errors
    ///
    /// - `NegativeVolume` for non-positive sent or negative transit loss
    /// - `TransitLossExceedsSent` if nothing would be accepted
    /// - `InvalidPrice` unless the unit price is positive
    /// - `InvalidPayment` for a negative paid amount
    /// - `OverPayment` if paid exceeds the total price
    pub fn validate(&self) -> Result<(), SalesError> {
        if self.sent_volume <= Decimal::ZERO {
            return Err(SalesError::NegativeVolume {
                field: "sent".to_string(),
                value: self.sent_volume,
            });
        }
        if self.transit_loss_volume < Decimal::ZERO {
            return Err(SalesError::NegativeVolume {
                field: "transit loss".to_string(),
                value: self.transit_loss_volume,
            });
        }
        if self.transit_loss_volume >= self.sent_volume {
            return Err(SalesError::TransitLossExceedsSent {
                sent: self.sent_volume,
                loss: self.transit_loss_volume,
            });
        }
        if self.unit_price <= Decimal::ZERO {
            return Err(SalesError::InvalidPrice(self.unit_price));
        }
        if self.paid_amount < Decimal::ZERO {
            return Err(SalesError::InvalidPayment(self.paid_amount));
        }
        let total = self.total_price();
        if self.paid_amount > total.amount() {
            return Err(SalesError::OverPayment {
                paid: self.paid_amount,
                due: total.amount(),
            });
        }
        Ok(())
    }

    /// Checks the accepted volume against the lot's remaining volume
    pub fn check_inventory(&self, lot: &Lot) -> Result<(), SalesError> {
        let accepted = self.accepted_volume();
        if accepted > lot.remaining_volume() {
            return Err(InventoryError::InsufficientInventory {
                lot_id: lot.id,
                requested: accepted,
                remaining: lot.remaining_volume(),
            }
            .into());
        }
        Ok(())
    }
}

/// A release of volume from a lot to a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleEvent {
    pub id: SaleId,
    pub lot_id: LotId,
    pub shipment_id: ShipmentId,
    pub client_id: ClientId,
    pub sent_volume: Decimal,
    pub transit_loss_volume: Decimal,
    pub accepted_volume: Decimal,
    pub unit_price: Money,
    pub total_price: Money,
    pub paid_amount: Money,
    pub debt: Money,
    pub payment_state: PaymentState,
    /// Total price in base currency at the sale date
    pub revenue_conversion: ValuationConversion,
    pub sale_date: NaiveDate,
    pub notes: Option<String>,
    pub recorded_by: String,
    pub version: u64,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SaleEvent {
    /// Builds the sale from a validated request
    ///
    /// # Errors
    ///
    /// Any failure from [`DispatchRequest::validate`] or
    /// [`DispatchRequest::check_inventory`].
    pub fn create(
        request: &DispatchRequest,
        lot: &Lot,
        revenue_conversion: ValuationConversion,
        actor: &Actor,
    ) -> Result<Self, SalesError> {
        request.validate()?;
        request.check_inventory(lot)?;

        let total_price = request.total_price();
        let paid_amount = Money::new(request.paid_amount, request.currency);
        let debt = total_price.checked_sub(&paid_amount)?;
        let now = Utc::now();

        Ok(Self {
            id: SaleId::new(),
            lot_id: lot.id,
            shipment_id: lot.shipment_id,
            client_id: request.client_id,
            sent_volume: round_volume(request.sent_volume),
            transit_loss_volume: round_volume(request.transit_loss_volume),
            accepted_volume: request.accepted_volume(),
            unit_price: Money::new(request.unit_price, request.currency),
            payment_state: PaymentState::derive(&total_price, &paid_amount),
            total_price,
            paid_amount,
            debt,
            revenue_conversion,
            sale_date: request.sale_date,
            notes: request.notes.clone(),
            recorded_by: actor.id.clone(),
            version: 1,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn currency(&self) -> Currency {
        self.total_price.currency()
    }

    /// Applies a later payment against this sale's debt
    ///
    /// # Errors
    ///
    /// - `CurrencyMismatch` if the payment is in another currency
    /// - `InvalidPayment` for a non-positive amount
    /// - `OverPayment` if the amount exceeds the outstanding debt
    pub fn record_payment(&mut self, amount: &Money) -> Result<(), SalesError> {
        if amount.currency() != self.currency() {
            return Err(SalesError::CurrencyMismatch {
                expected: self.currency().to_string(),
                actual: amount.currency().to_string(),
            });
        }
        if !amount.is_positive() {
            return Err(SalesError::InvalidPayment(amount.amount()));
        }
        if amount.amount() > self.debt.amount() {
            return Err(SalesError::OverPayment {
                paid: amount.amount(),
                due: self.debt.amount(),
            });
        }

        self.paid_amount = self.paid_amount.checked_add(amount)?;
        self.settle()
    }

    /// Backs out a payment whose ledger entry was reversed
    ///
    /// # Errors
    ///
    /// - `CurrencyMismatch` if the amount is in another currency
    /// - `InvalidPayment` for a non-positive amount or one larger than what
    ///   has been paid
    pub fn reverse_payment(&mut self, amount: &Money) -> Result<(), SalesError> {
        if amount.currency() != self.currency() {
            return Err(SalesError::CurrencyMismatch {
                expected: self.currency().to_string(),
                actual: amount.currency().to_string(),
            });
        }
        if !amount.is_positive() || amount.amount() > self.paid_amount.amount() {
            return Err(SalesError::InvalidPayment(amount.amount()));
        }

        self.paid_amount = self.paid_amount.checked_sub(amount)?;
        self.settle()
    }

    fn settle(&mut self) -> Result<(), SalesError> {
        self.debt = self.total_price.checked_sub(&self.paid_amount)?;
        self.payment_state = PaymentState::derive(&self.total_price, &self.paid_amount);
        self.version += 1;
        self.updated_at = Utc::now();
        Ok(())
    }
}
