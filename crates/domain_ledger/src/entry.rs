//! Cash ledger entries

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{ClientId, Currency, ExpenseId, LedgerEntryId, Money, SaleId, ShipmentId};

use crate::error::LedgerError;

/// Kind of monetary movement
///
/// | Kind | Sign | Client | Notes |
/// |---|---|---|---|
/// | DebtCreation | + | required | total price of a sale |
/// | OpeningBalance | + | required | debt carried in from before the ledger |
/// | Payment | − | required | money received from a client |
/// | Expense | − | none | shared cost paid for a shipment |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    DebtCreation,
    Payment,
    Expense,
    OpeningBalance,
}

impl EntryKind {
    /// Sign applied to the entry amount when aggregating balances
    pub fn sign(&self) -> Decimal {
        match self {
            EntryKind::DebtCreation | EntryKind::OpeningBalance => Decimal::ONE,
            EntryKind::Payment | EntryKind::Expense => Decimal::NEGATIVE_ONE,
        }
    }

    /// Whether the entry must reference a client
    pub fn requires_client(&self) -> bool {
        !matches!(self, EntryKind::Expense)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryKind::DebtCreation => "debt_creation",
            EntryKind::Payment => "payment",
            EntryKind::Expense => "expense",
            EntryKind::OpeningBalance => "opening_balance",
        };
        f.write_str(name)
    }
}

/// An immutable record of one monetary movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub kind: EntryKind,
    /// Unsigned magnitude for originals; negated for reversals
    pub amount: Money,
    pub client_id: Option<ClientId>,
    pub shipment_id: Option<ShipmentId>,
    pub sale_id: Option<SaleId>,
    pub expense_id: Option<ExpenseId>,
    /// Set on an offsetting entry to the entry it cancels
    pub reverses: Option<LedgerEntryId>,
    pub description: String,
    pub entry_date: NaiveDate,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Starts building an entry of the given kind
    pub fn builder(kind: EntryKind, amount: Money, entry_date: NaiveDate) -> LedgerEntryBuilder {
        LedgerEntryBuilder {
            kind,
            amount,
            entry_date,
            client_id: None,
            shipment_id: None,
            sale_id: None,
            expense_id: None,
            description: String::new(),
            recorded_by: String::new(),
        }
    }

    pub fn currency(&self) -> Currency {
        self.amount.currency()
    }

    /// Amount with the kind's sign applied
    pub fn signed_amount(&self) -> Money {
        self.amount.multiply(self.kind.sign())
    }

    pub fn is_reversal(&self) -> bool {
        self.reverses.is_some()
    }

    /// Builds the offsetting entry for this one
    pub fn reversal(&self, reason: &str, recorded_by: &str, entry_date: NaiveDate) -> LedgerEntry {
        LedgerEntry {
            id: LedgerEntryId::new(),
            kind: self.kind,
            amount: -self.amount,
            client_id: self.client_id,
            shipment_id: self.shipment_id,
            sale_id: self.sale_id,
            expense_id: self.expense_id,
            reverses: Some(self.id),
            description: format!("Reversal of {}: {}", self.id, reason),
            entry_date,
            recorded_by: recorded_by.to_string(),
            recorded_at: Utc::now(),
        }
    }
}

/// Builder for [`LedgerEntry`]
#[derive(Debug, Clone)]
pub struct LedgerEntryBuilder {
    kind: EntryKind,
    amount: Money,
    entry_date: NaiveDate,
    client_id: Option<ClientId>,
    shipment_id: Option<ShipmentId>,
    sale_id: Option<SaleId>,
    expense_id: Option<ExpenseId>,
    description: String,
    recorded_by: String,
}

impl LedgerEntryBuilder {
    pub fn client(mut self, id: ClientId) -> Self {
        self.client_id = Some(id);
        self
    }

    pub fn shipment(mut self, id: ShipmentId) -> Self {
        self.shipment_id = Some(id);
        self
    }

    pub fn sale(mut self, id: SaleId) -> Self {
        self.sale_id = Some(id);
        self
    }

    pub fn expense(mut self, id: ExpenseId) -> Self {
        self.expense_id = Some(id);
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    pub fn recorded_by(mut self, actor: impl Into<String>) -> Self {
        self.recorded_by = actor.into();
        self
    }

    /// Validates and builds the entry
    ///
    /// # Errors
    ///
    /// `MalformedEntry` for a non-positive amount or a missing client on a
    /// kind that needs one.
    pub fn build(self) -> Result<LedgerEntry, LedgerError> {
        if !self.amount.is_positive() {
            return Err(LedgerError::MalformedEntry(format!(
                "{} amount must be positive, got {}",
                self.kind, self.amount
            )));
        }
        if self.kind.requires_client() && self.client_id.is_none() {
            return Err(LedgerError::MalformedEntry(format!("{} entry requires a client", self.kind)));
        }
        if !self.kind.requires_client() && self.client_id.is_some() {
            return Err(LedgerError::MalformedEntry(format!("{} entry cannot reference a client", self.kind)));
        }

        Ok(LedgerEntry {
            id: LedgerEntryId::new(),
            kind: self.kind,
            amount: self.amount,
            client_id: self.client_id,
            shipment_id: self.shipment_id,
            sale_id: self.sale_id,
            expense_id: self.expense_id,
            reverses: None,
            description: self.description,
            entry_date: self.entry_date,
            recorded_by: self.recorded_by,
            recorded_at: Utc::now(),
        })
    }
}
