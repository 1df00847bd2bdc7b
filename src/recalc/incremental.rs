//! Incremental recalculation: checkpoint-driven deltas and edit-scoped rederivation.

use super::{fold_trades, Recalculator};
use crate::domain::{Position, SecurityCode, TradeId, Transaction};
use crate::engine::PositionAccumulator;
use crate::store::{PositionDiff, StoreError};
use std::collections::BTreeSet;
use tracing::{debug, info};

impl Recalculator {
    /// Fold ledger rows newer than the checkpoint into positions.
    ///
    /// Every security touched by the new rows, or by any stored version of a
    /// trade they belong to, is re-derived from scratch. Other positions are not
    /// written. The checkpoint advances to the highest new store id after the
    /// position write succeeded.
    ///
    /// # Returns
    /// All positions, security code ascending (unchanged when nothing is new)
    ///
    /// # Errors
    /// Returns an error if any store operation fails.
    pub async fn recalculate_delta(&self) -> Result<Vec<Position>, StoreError> {
        let mut state = self.processing_state().await?;
        let new_rows = self
            .stores
            .ledger
            .find_with_id_greater_than(state.last_processed_transaction_id)
            .await?;

        let Some(max_new_id) = new_rows.iter().map(|t| t.id).max() else {
            debug!(checkpoint = %state.last_processed_transaction_id, "No new transactions since checkpoint");
            return self.stores.positions.find_all().await;
        };

        let touched = self.touched_by(&new_rows).await?;
        let diff = self.rederive(&touched).await?;

        if state.advance_to(max_new_id) {
            self.stores.checkpoint.write(&state).await?;
        }

        info!(
            new_rows = new_rows.len(),
            touched = touched.len(),
            upserts = diff.upserts.len(),
            deletes = diff.deletes.len(),
            checkpoint = %state.last_processed_transaction_id,
            "Delta recalculation complete"
        );

        self.stores.positions.find_all().await
    }

    /// Re-derive the given securities without moving the checkpoint.
    ///
    /// # Errors
    /// Returns an error if any store operation fails.
    pub async fn recalculate_securities(
        &self,
        touched: &BTreeSet<SecurityCode>,
    ) -> Result<Vec<Position>, StoreError> {
        let diff = self.rederive(touched).await?;
        debug!(
            touched = touched.len(),
            upserts = diff.upserts.len(),
            deletes = diff.deletes.len(),
            "Security-scoped recalculation complete"
        );
        self.stores.positions.find_all().await
    }

    /// Recompute after `previous` was overwritten in place by `updated`.
    ///
    /// Both the old and the new security are re-derived. When the edit moved
    /// the record to another trade or changed its version, the authoritative
    /// record of either trade may now sit on yet another security, so every
    /// security those trades carry is included. The checkpoint is not moved.
    ///
    /// # Errors
    /// Returns an error if any store operation fails.
    pub async fn recalculate_after_edit(
        &self,
        previous: &Transaction,
        updated: &Transaction,
    ) -> Result<Vec<Position>, StoreError> {
        let mut touched = BTreeSet::from([
            previous.security_code.clone(),
            updated.security_code.clone(),
        ]);

        if previous.trade_id != updated.trade_id || previous.version != updated.version {
            let trade_ids = dedup_trade_ids([previous.trade_id, updated.trade_id]);
            let versions = self.stores.ledger.find_by_trade_ids(&trade_ids).await?;
            touched.extend(versions.into_iter().map(|t| t.security_code));
        }

        self.recalculate_securities(&touched).await
    }

    /// Securities whose net may have changed because of `new_rows`.
    async fn touched_by(
        &self,
        new_rows: &[Transaction],
    ) -> Result<BTreeSet<SecurityCode>, StoreError> {
        let mut touched: BTreeSet<SecurityCode> =
            new_rows.iter().map(|t| t.security_code.clone()).collect();

        // A new version can move a trade off the security its older versions used.
        let trade_ids = dedup_trade_ids(new_rows.iter().map(|t| t.trade_id));
        let history = self.stores.ledger.find_by_trade_ids(&trade_ids).await?;
        touched.extend(history.into_iter().map(|t| t.security_code));

        Ok(touched)
    }

    /// Reset `touched` to zero and rebuild them from every trade that has ever
    /// referenced one of them.
    async fn rederive(&self, touched: &BTreeSet<SecurityCode>) -> Result<PositionDiff, StoreError> {
        if touched.is_empty() {
            return Ok(PositionDiff::default());
        }

        let codes: Vec<SecurityCode> = touched.iter().cloned().collect();
        let trade_ids = self
            .stores
            .ledger
            .find_trade_ids_for_security_codes(&codes)
            .await?;
        let rows = self.stores.ledger.find_by_trade_ids(&trade_ids).await?;

        let existing = self.stores.positions.find_all().await?;
        let mut acc = PositionAccumulator::seeded(&existing);
        acc.reset(touched);

        // Trades now resolving onto an untouched security are already counted there.
        let folded = fold_trades(&mut acc, rows, |impact| {
            touched.contains(&impact.security_code)
        })?;
        debug!(trades = trade_ids.len(), folded, "Re-derived touched securities");

        let diff = acc.diff_against(&existing);
        if !diff.is_empty() {
            self.stores.positions.apply(&diff).await?;
        }
        Ok(diff)
    }
}

fn dedup_trade_ids<I>(ids: I) -> Vec<TradeId>
where
    I: IntoIterator<Item = TradeId>,
{
    ids.into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
