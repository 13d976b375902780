//! Operation results and read models

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{ClientId, Currency, LiabilityId, LotId, Money, ShipmentId};
use domain_inventory::{LifecycleTransition, Liability, LossRecord, Lot, LotFigures, Route, ShipmentState, ShipmentTotals};
use domain_ledger::Client;

/// Successful operation result with any non-fatal anomalies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completed<T> {
    pub value: T,
    pub warnings: Vec<Warning>,
}

impl<T> Completed<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Completed<U> {
        Completed {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}

/// A non-fatal anomaly attached to a successful operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Warning {
    /// The audit sink rejected a record
    AuditNotRecorded { action: String, reason: String },
    /// A valuation used a fallback rate; the entity is flagged degraded
    DegradedValuation {
        entity_type: String,
        entity_id: String,
        reason: String,
    },
}

/// Result of recording a loss
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LossOutcome {
    pub loss: LossRecord,
    pub liability: Option<Liability>,
}

/// Per-lot line of a shipment summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotSummary {
    pub id: LotId,
    pub name: String,
    pub quantity: u32,
    pub total_volume: Decimal,
    pub loss_volume: Decimal,
    pub dispatched_volume: Decimal,
    pub purchase_amount: Money,
    pub allocated_expenses: Money,
    pub revenue: Money,
    pub figures: LotFigures,
    pub degraded_valuation: bool,
}

impl From<&Lot> for LotSummary {
    fn from(lot: &Lot) -> Self {
        Self {
            id: lot.id,
            name: lot.name.clone(),
            quantity: lot.quantity,
            total_volume: lot.total_volume,
            loss_volume: lot.loss_volume,
            dispatched_volume: lot.dispatched_volume,
            purchase_amount: lot.purchase_amount,
            allocated_expenses: lot.allocated_expenses,
            revenue: lot.revenue,
            figures: lot.figures.clone(),
            degraded_valuation: lot.is_degraded(),
        }
    }
}

/// Shipment read model returned by `get_shipment_summary`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentSummary {
    pub id: ShipmentId,
    pub code: String,
    pub intake_date: NaiveDate,
    pub route: Route,
    pub state: ShipmentState,
    pub totals: ShipmentTotals,
    pub transit_loss_volume: Decimal,
    pub lots: Vec<LotSummary>,
    pub expense_count: usize,
    pub open_liabilities: Vec<LiabilityId>,
    pub transitions: Vec<LifecycleTransition>,
    pub version: u64,
}

/// One currency of a client balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyBalanceView {
    pub currency: Currency,
    pub issued: Money,
    pub paid: Money,
    /// Outstanding debt, never below zero
    pub current_debt: Money,
    /// Issued minus paid; negative when the client is in credit
    pub net: Money,
}

/// Client read model returned by `get_client_balance`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientBalanceView {
    pub client_id: ClientId,
    pub name: String,
    pub balances: Vec<CurrencyBalanceView>,
}

impl ClientBalanceView {
    pub fn from_client(client: &Client) -> Result<Self, domain_ledger::LedgerError> {
        let balances = client
            .balances
            .iter()
            .map(|(currency, balance)| {
                Ok(CurrencyBalanceView {
                    currency: *currency,
                    issued: balance.issued,
                    paid: balance.paid,
                    current_debt: balance.current_debt()?,
                    net: balance.net()?,
                })
            })
            .collect::<Result<Vec<_>, domain_ledger::LedgerError>>()?;
        Ok(Self {
            client_id: client.id,
            name: client.name.clone(),
            balances,
        })
    }

    /// Balance line for a currency, if the client has traded in it
    pub fn currency(&self, currency: Currency) -> Option<&CurrencyBalanceView> {
        self.balances.iter().find(|b| b.currency == currency)
    }
}
