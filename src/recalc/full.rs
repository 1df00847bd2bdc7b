//! Full rebuild of positions from the entire ledger.

use super::{fold_trades, Recalculator};
use crate::domain::{Position, ProcessingState, StoreId};
use crate::engine::PositionAccumulator;
use crate::store::StoreError;
use tracing::info;

impl Recalculator {
    /// Rebuild every position from the whole ledger, ignoring the checkpoint.
    ///
    /// Positions are diffed against the store (only changed entries are
    /// written), then the checkpoint is set to the highest store id in the
    /// ledger. Running this twice without intervening writes changes nothing.
    ///
    /// # Returns
    /// All positions, security code ascending
    ///
    /// # Errors
    /// Returns an error if any store operation fails; the checkpoint is left
    /// untouched when the position write fails.
    pub async fn recalculate_all(&self) -> Result<Vec<Position>, StoreError> {
        let transactions = self
            .stores
            .ledger
            .find_all_grouped_by_trade_then_version()
            .await?;
        let row_count = transactions.len();
        let max_id = transactions
            .iter()
            .map(|t| t.id)
            .max()
            .unwrap_or(StoreId::new(0));

        let mut acc = PositionAccumulator::new();
        let trades = fold_trades(&mut acc, transactions, |_| true)?;

        let existing = self.stores.positions.find_all().await?;
        let diff = acc.diff_against(&existing);
        if !diff.is_empty() {
            self.stores.positions.apply(&diff).await?;
        }

        let stored = self.stores.checkpoint.read().await?;
        let current = stored
            .as_ref()
            .map(|s| s.last_processed_transaction_id)
            .unwrap_or_default();
        if current != max_id {
            self.stores
                .checkpoint
                .write(&ProcessingState::at(max_id))
                .await?;
        }

        info!(
            rows = row_count,
            trades,
            upserts = diff.upserts.len(),
            deletes = diff.deletes.len(),
            checkpoint = %max_id,
            "Full recalculation complete"
        );

        self.stores.positions.find_all().await
    }
}
