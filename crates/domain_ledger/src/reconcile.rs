//! Client balance reconciliation against the cash ledger

use serde::{Deserialize, Serialize};
use tracing::warn;

use core_kernel::{ClientId, Currency};

use crate::client::{Client, CurrencyBalance};
use crate::error::LedgerError;
use crate::ledger::CashLedger;

/// Stored client totals that disagree with a ledger replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDivergence {
    pub client_id: ClientId,
    pub currency: Currency,
    pub stored: CurrencyBalance,
    pub replayed: CurrencyBalance,
}

/// Compares every client's stored totals with a replay of the ledger
///
/// Also reports ledger clients with no client record as divergent against
/// a zero balance.
pub fn reconcile_clients<'a>(
    clients: impl IntoIterator<Item = &'a Client>,
    ledger: &CashLedger,
) -> Result<Vec<BalanceDivergence>, LedgerError> {
    let mut divergences = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for client in clients {
        seen.insert(client.id);
        let replayed = Client::replay(client.id, ledger.entries())?;

        let currencies: std::collections::BTreeSet<Currency> =
            client.balances.keys().chain(replayed.keys()).copied().collect();

        for currency in currencies {
            let stored = client.balance(currency);
            let expected = replayed
                .get(&currency)
                .copied()
                .unwrap_or_else(|| CurrencyBalance::zero(currency));
            if stored != expected {
                warn!(
                    client_id = %client.id,
                    currency = %currency,
                    stored_issued = %stored.issued,
                    replayed_issued = %expected.issued,
                    stored_paid = %stored.paid,
                    replayed_paid = %expected.paid,
                    "client balance diverges from ledger"
                );
                divergences.push(BalanceDivergence {
                    client_id: client.id,
                    currency,
                    stored,
                    replayed: expected,
                });
            }
        }
    }

    for orphan in ledger.clients().into_iter().filter(|id| !seen.contains(id)) {
        for (currency, replayed) in Client::replay(orphan, ledger.entries())? {
            warn!(client_id = %orphan, currency = %currency, "ledger references unknown client");
            divergences.push(BalanceDivergence {
                client_id: orphan,
                currency,
                stored: CurrencyBalance::zero(currency),
                replayed,
            });
        }
    }

    Ok(divergences)
}
