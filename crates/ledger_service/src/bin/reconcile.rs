//! Ledger reconciliation job
//!
//! Loads a JSON snapshot of the ledger store, replays the cash ledger and
//! rebuilds every derived figure, then prints the report. Exits with status
//! 1 if anything diverges.
//!
//! # Usage
//!
//! ```bash
//! ledger-reconcile snapshot.json
//!
//! # or
//! LEDGER_SNAPSHOT_PATH=snapshot.json ledger-reconcile
//! ```
//!
//! # Environment Variables
//!
//! * `LEDGER_SNAPSHOT_PATH` - Snapshot to read when no path argument is given
//! * `LEDGER_LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)
//! * `LEDGER_LOG_JSON` - Emit JSON log lines (default: false)

use anyhow::{bail, Context};
use std::path::PathBuf;

use ledger_service::{init_tracing, reconcile_state, LedgerState, ServiceConfig};

fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ServiceConfig::from_env().unwrap_or_else(|e| {
        eprintln!("invalid LEDGER_* configuration ({}), using defaults", e);
        ServiceConfig::default()
    });
    init_tracing(&config.log_level, config.log_json);

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| config.snapshot_path.clone())
        .context("no snapshot path given; pass one or set LEDGER_SNAPSHOT_PATH")?;

    tracing::info!(path = %path.display(), "reconciling snapshot");

    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let state: LedgerState =
        serde_json::from_str(&raw).with_context(|| format!("parsing snapshot {}", path.display()))?;

    let report = reconcile_state(&state)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_consistent() {
        bail!("{} divergence(s) found", report.divergences.len());
    }
    Ok(())
}
