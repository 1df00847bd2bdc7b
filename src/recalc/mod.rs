//! Recalculation of derived positions from the transaction ledger.
//!
//! This module provides:
//! - Checkpoint-driven delta recalculation over newly ingested rows
//! - Security-scoped recalculation for in-place edits
//! - Full rebuild from the whole ledger, re-synchronizing the checkpoint
//!
//! None of these take a lock; callers serialize writers (see
//! `orchestration::LedgerService`).

use crate::domain::{ProcessingState, Transaction};
use crate::engine::{group_by_trade, resolve_trade, PositionAccumulator, TradeImpact};
use crate::store::{StoreError, Stores};
use tracing::{error, warn};

pub mod full;
pub mod incremental;

/// Runs recalculations against a set of stores.
#[derive(Clone)]
pub struct Recalculator {
    stores: Stores,
}

impl Recalculator {
    pub fn new(stores: Stores) -> Self {
        Recalculator { stores }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Stored checkpoint, or the initial state when none was written yet.
    ///
    /// # Errors
    /// Returns an error if the checkpoint store cannot be read.
    pub async fn processing_state(&self) -> Result<ProcessingState, StoreError> {
        Ok(self.stores.checkpoint.read().await?.unwrap_or_default())
    }
}

/// Resolve each trade in `transactions` and fold the ones accepted by `keep`.
///
/// Returns the number of trades folded. A net leaving the decimal range is
/// reported as a corrupt ledger; callers fold before writing anything.
fn fold_trades<F>(
    acc: &mut PositionAccumulator,
    transactions: Vec<Transaction>,
    keep: F,
) -> Result<usize, StoreError>
where
    F: Fn(&TradeImpact) -> bool,
{
    let mut folded = 0;
    for (trade_id, versions) in group_by_trade(transactions) {
        match resolve_trade(&versions) {
            Some(impact) if keep(&impact) => {
                acc.add(&impact).map_err(|e| {
                    error!(trade_id = %trade_id, error = %e, "Position sum overflowed");
                    StoreError::Corrupt(e.to_string())
                })?;
                folded += 1;
            }
            Some(_) => {}
            None => {
                warn!(trade_id = %trade_id, "Data integrity anomaly: trade has no resolvable version, contributing zero");
            }
        }
    }
    Ok(folded)
}
