//! Client Debt Ledger
//!
//! Per-client, per-currency running totals of debt issued and payments
//! received. Totals change only by applying ledger entries, so they can
//! always be rebuilt by replaying the cash ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use core_kernel::{ClientId, Currency, Money};

use crate::entry::{EntryKind, LedgerEntry};
use crate::error::LedgerError;

/// Cumulative totals for one currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyBalance {
    pub issued: Money,
    pub paid: Money,
}

impl CurrencyBalance {
    pub fn zero(currency: Currency) -> Self {
        Self {
            issued: Money::zero(currency),
            paid: Money::zero(currency),
        }
    }

    /// Issued minus paid; negative when the client has paid in advance
    pub fn net(&self) -> Result<Money, LedgerError> {
        Ok(self.issued.checked_sub(&self.paid)?)
    }

    /// Outstanding debt for display, never below zero
    pub fn current_debt(&self) -> Result<Money, LedgerError> {
        Ok(self.net()?.floor_zero())
    }

    /// Folds one entry into the totals
    fn apply(&mut self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        match entry.kind {
            EntryKind::DebtCreation | EntryKind::OpeningBalance => {
                self.issued = self.issued.checked_add(&entry.amount)?;
            }
            EntryKind::Payment => {
                self.paid = self.paid.checked_add(&entry.amount)?;
            }
            EntryKind::Expense => {
                return Err(LedgerError::MalformedEntry(format!(
                    "expense entry {} cannot be applied to a client",
                    entry.id
                )));
            }
        }
        Ok(())
    }
}

/// A buyer with debt balances in one or more currencies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub balances: BTreeMap<Currency, CurrencyBalance>,
    pub version: u64,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    pub fn new(name: impl Into<String>) -> Result<Self, LedgerError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LedgerError::MalformedEntry("client name is required".to_string()));
        }
        let now = Utc::now();
        Ok(Self {
            id: ClientId::new(),
            name,
            balances: BTreeMap::new(),
            version: 1,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Totals for a currency; zero if the client never traded in it
    pub fn balance(&self, currency: Currency) -> CurrencyBalance {
        self.balances
            .get(&currency)
            .copied()
            .unwrap_or_else(|| CurrencyBalance::zero(currency))
    }

    /// Applies an entry that references this client
    ///
    /// # Errors
    ///
    /// `ClientMismatch` if the entry is for another client, `MalformedEntry`
    /// for an expense entry.
    pub fn apply(&mut self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        if entry.client_id != Some(self.id) {
            return Err(LedgerError::ClientMismatch {
                entry: entry.id.to_string(),
                client: self.id.to_string(),
            });
        }
        let currency = entry.currency();
        let mut balance = self.balance(currency);
        balance.apply(entry)?;
        self.balances.insert(currency, balance);
        self.version += 1;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Totals obtained by replaying the given entries for this client
    pub fn replay<'a>(
        client_id: ClientId,
        entries: impl IntoIterator<Item = &'a LedgerEntry>,
    ) -> Result<BTreeMap<Currency, CurrencyBalance>, LedgerError> {
        let mut balances: BTreeMap<Currency, CurrencyBalance> = BTreeMap::new();
        for entry in entries.into_iter().filter(|e| e.client_id == Some(client_id)) {
            balances
                .entry(entry.currency())
                .or_insert_with(|| CurrencyBalance::zero(entry.currency()))
                .apply(entry)?;
        }
        Ok(balances)
    }

    /// Replaces the stored totals with a replay of the ledger
    pub fn rebuild_from_ledger<'a>(
        &mut self,
        entries: impl IntoIterator<Item = &'a LedgerEntry>,
    ) -> Result<(), LedgerError> {
        self.balances = Self::replay(self.id, entries)?;
        self.version += 1;
        self.updated_at = Utc::now();
        Ok(())
    }
}
