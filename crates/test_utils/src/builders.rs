//! Test Data Builders
//!
//! Builder patterns for operation inputs with sensible defaults, so tests
//! only spell out the fields they care about.

use chrono::NaiveDate;
use core_kernel::{ClientId, Currency, LotId, Money};
use domain_inventory::{NewLot, NewShipment, Route};
use domain_sales::DispatchRequest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::fixtures::{DateFixtures, MoneyFixtures};

/// Builder for [`NewShipment`]
pub struct ShipmentBuilder {
    code: String,
    intake_date: NaiveDate,
    route: Route,
}

impl Default for ShipmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ShipmentBuilder {
    pub fn new() -> Self {
        Self {
            code: "W-1042".to_string(),
            intake_date: DateFixtures::intake(),
            route: Route {
                origin: "Krasnoyarsk".to_string(),
                destination: "Tashkent".to_string(),
            },
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_intake_date(mut self, date: NaiveDate) -> Self {
        self.intake_date = date;
        self
    }

    pub fn build(self) -> NewShipment {
        NewShipment {
            code: self.code,
            intake_date: self.intake_date,
            route: self.route,
        }
    }
}

/// Builder for [`NewLot`]; defaults to the 100 m³ / 50,000 RUB scenario lot
pub struct LotBuilder {
    name: String,
    quantity: u32,
    total_volume: Decimal,
    purchase_amount: Money,
}

impl Default for LotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LotBuilder {
    pub fn new() -> Self {
        Self {
            name: "pine 50x150".to_string(),
            quantity: 420,
            total_volume: dec!(100),
            purchase_amount: MoneyFixtures::rub_purchase(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_volume(mut self, volume: Decimal) -> Self {
        self.total_volume = volume;
        self
    }

    pub fn with_purchase(mut self, amount: Money) -> Self {
        self.purchase_amount = amount;
        self
    }

    pub fn build(self) -> NewLot {
        NewLot {
            name: self.name,
            quantity: self.quantity,
            total_volume: self.total_volume,
            purchase_amount: self.purchase_amount,
        }
    }
}

/// Builder for [`DispatchRequest`]; defaults to 30 m³ at 20 USD, 300 paid
pub struct DispatchBuilder {
    request: DispatchRequest,
}

impl DispatchBuilder {
    pub fn new(lot_id: LotId, client_id: ClientId) -> Self {
        Self {
            request: DispatchRequest {
                lot_id,
                client_id,
                sent_volume: dec!(30),
                transit_loss_volume: Decimal::ZERO,
                unit_price: dec!(20),
                currency: Currency::USD,
                paid_amount: dec!(300),
                sale_date: DateFixtures::sale(),
                notes: None,
            },
        }
    }

    pub fn sent(mut self, volume: Decimal) -> Self {
        self.request.sent_volume = volume;
        self
    }

    pub fn transit_loss(mut self, volume: Decimal) -> Self {
        self.request.transit_loss_volume = volume;
        self
    }

    pub fn price(mut self, unit_price: Decimal, currency: Currency) -> Self {
        self.request.unit_price = unit_price;
        self.request.currency = currency;
        self
    }

    pub fn paid(mut self, amount: Decimal) -> Self {
        self.request.paid_amount = amount;
        self
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.request.sale_date = date;
        self
    }

    pub fn build(self) -> DispatchRequest {
        self.request
    }
}
