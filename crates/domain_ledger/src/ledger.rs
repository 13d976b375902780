//! Append-only cash ledger
//!
//! The ledger is the source of truth for balances. Entries are never
//! modified or removed; corrections are offsetting entries linked through
//! [`LedgerEntry::reverses`].
//!
//! # Invariants
//!
//! - Entries are only ever appended
//! - An entry is reversed at most once, and reversals are not reversible
//! - Balances are pure aggregations over entries

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use core_kernel::{ClientId, Currency, LedgerEntryId, Money};

use crate::entry::{EntryKind, LedgerEntry};
use crate::error::LedgerError;

/// Journal of monetary movements
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CashLedger {
    entries: Vec<LedgerEntry>,
}

impl CashLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a built entry
    pub fn append(&mut self, entry: LedgerEntry) -> LedgerEntryId {
        let id = entry.id;
        self.entries.push(entry);
        id
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: LedgerEntryId) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Builds the offsetting entry for `id` without appending it
    ///
    /// # Errors
    ///
    /// - `EntryNotFound` if no such entry exists
    /// - `ReversalOfReversal` if the entry is itself a reversal
    /// - `AlreadyReversed` if an offsetting entry already exists
    pub fn prepare_reversal(
        &self,
        id: LedgerEntryId,
        reason: &str,
        recorded_by: &str,
        entry_date: NaiveDate,
    ) -> Result<LedgerEntry, LedgerError> {
        let original = self
            .get(id)
            .ok_or_else(|| LedgerError::EntryNotFound(id.to_string()))?;
        if original.is_reversal() {
            return Err(LedgerError::ReversalOfReversal(id.to_string()));
        }
        if self.entries.iter().any(|e| e.reverses == Some(id)) {
            return Err(LedgerError::AlreadyReversed(id.to_string()));
        }
        Ok(original.reversal(reason, recorded_by, entry_date))
    }

    /// Signed sum of all entries in a currency
    pub fn balance(&self, currency: Currency) -> Result<Money, LedgerError> {
        self.signed_sum(currency, |_| true)
    }

    /// Signed sum of one client's entries in a currency
    pub fn client_balance(&self, client_id: ClientId, currency: Currency) -> Result<Money, LedgerError> {
        self.signed_sum(currency, |e| e.client_id == Some(client_id))
    }

    /// Unsigned sum of one kind of entry in a currency, reversals included
    pub fn total_of_kind(&self, kind: EntryKind, currency: Currency) -> Result<Money, LedgerError> {
        let amounts: Vec<Money> = self
            .entries
            .iter()
            .filter(|e| e.kind == kind && e.currency() == currency)
            .map(|e| e.amount)
            .collect();
        Ok(Money::sum(currency, amounts.iter())?)
    }

    /// Entries referencing a client, in append order
    pub fn entries_for_client(&self, client_id: ClientId) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter().filter(move |e| e.client_id == Some(client_id))
    }

    /// Clients that appear in the ledger
    pub fn clients(&self) -> HashSet<ClientId> {
        self.entries.iter().filter_map(|e| e.client_id).collect()
    }

    fn signed_sum(&self, currency: Currency, include: impl Fn(&LedgerEntry) -> bool) -> Result<Money, LedgerError> {
        let signed: Vec<Money> = self
            .entries
            .iter()
            .filter(|e| e.currency() == currency && include(e))
            .map(LedgerEntry::signed_amount)
            .collect();
        Ok(Money::sum(currency, signed.iter())?)
    }
}
