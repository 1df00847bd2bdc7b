//! In-process store for tests and ephemeral runs.

use super::{CheckpointStore, LedgerStore, PositionDiff, PositionStore, StateReset, StoreError};
use crate::domain::{
    Decimal, NewTransaction, Position, ProcessingState, SecurityCode, StoreId, TradeId,
    Transaction, TransactionId,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct State {
    /// Kept in store id order.
    transactions: Vec<Transaction>,
    last_id: i64,
    positions: BTreeMap<SecurityCode, Decimal>,
    checkpoint: Option<ProcessingState>,
}

impl State {
    fn append(&mut self, transaction_id: TransactionId, tx: &NewTransaction) -> Transaction {
        self.last_id += 1;
        let stored = Transaction::from_new(StoreId::new(self.last_id), transaction_id, tx);
        self.transactions.push(stored.clone());
        stored
    }

    fn has_transaction_id(&self, transaction_id: TransactionId) -> bool {
        self.transactions
            .iter()
            .any(|t| t.transaction_id == transaction_id)
    }
}

/// Ledger, position and checkpoint store held in memory.
///
/// Store ids keep increasing across `reset_all`, like an autoincrement column.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn lock_write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

fn sorted_by_trade_then_version(mut txs: Vec<Transaction>) -> Vec<Transaction> {
    txs.sort_by(|a, b| {
        a.trade_id
            .cmp(&b.trade_id)
            .then_with(|| a.version.cmp(&b.version))
            .then_with(|| a.id.cmp(&b.id))
    });
    txs
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert(
        &self,
        transaction_id: TransactionId,
        tx: &NewTransaction,
    ) -> Result<Transaction, StoreError> {
        let mut state = self.lock_write()?;
        if state.has_transaction_id(transaction_id) {
            return Err(StoreError::Conflict(format!(
                "transaction id {} already exists",
                transaction_id
            )));
        }
        Ok(state.append(transaction_id, tx))
    }

    async fn insert_batch(
        &self,
        batch: &[(TransactionId, NewTransaction)],
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut state = self.lock_write()?;

        // Check everything before touching state so a failure leaves no rows.
        let mut seen = HashSet::new();
        for (transaction_id, _) in batch {
            if state.has_transaction_id(*transaction_id) || !seen.insert(*transaction_id) {
                return Err(StoreError::Conflict(format!(
                    "transaction id {} already exists",
                    transaction_id
                )));
            }
        }

        Ok(batch
            .iter()
            .map(|(transaction_id, tx)| state.append(*transaction_id, tx))
            .collect())
    }

    async fn update_in_place(
        &self,
        existing: StoreId,
        tx: &NewTransaction,
    ) -> Result<Transaction, StoreError> {
        let mut state = self.lock_write()?;
        let row = state
            .transactions
            .iter_mut()
            .find(|t| t.id == existing)
            .ok_or_else(|| StoreError::NotFound(format!("transaction row {}", existing)))?;

        *row = Transaction::from_new(row.id, row.transaction_id, tx);
        Ok(row.clone())
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<Transaction>, StoreError> {
        Ok(self
            .lock_read()?
            .transactions
            .iter()
            .find(|t| t.transaction_id == transaction_id)
            .cloned())
    }

    async fn find_by_trade_id(&self, trade_id: TradeId) -> Result<Vec<Transaction>, StoreError> {
        self.find_by_trade_ids(&[trade_id]).await
    }

    async fn find_by_trade_ids(
        &self,
        trade_ids: &[TradeId],
    ) -> Result<Vec<Transaction>, StoreError> {
        let wanted: HashSet<TradeId> = trade_ids.iter().copied().collect();
        let matching = self
            .lock_read()?
            .transactions
            .iter()
            .filter(|t| wanted.contains(&t.trade_id))
            .cloned()
            .collect();
        Ok(sorted_by_trade_then_version(matching))
    }

    async fn find_max_transaction_id(&self) -> Result<Option<TransactionId>, StoreError> {
        Ok(self
            .lock_read()?
            .transactions
            .iter()
            .map(|t| t.transaction_id)
            .max())
    }

    async fn find_with_id_greater_than(
        &self,
        after: StoreId,
    ) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .lock_read()?
            .transactions
            .iter()
            .filter(|t| t.id > after)
            .cloned()
            .collect())
    }

    async fn find_trade_ids_for_security_codes(
        &self,
        codes: &[SecurityCode],
    ) -> Result<Vec<TradeId>, StoreError> {
        let trade_ids: BTreeSet<TradeId> = self
            .lock_read()?
            .transactions
            .iter()
            .filter(|t| codes.contains(&t.security_code))
            .map(|t| t.trade_id)
            .collect();
        Ok(trade_ids.into_iter().collect())
    }

    async fn find_all_grouped_by_trade_then_version(&self) -> Result<Vec<Transaction>, StoreError> {
        let all = self.lock_read()?.transactions.clone();
        Ok(sorted_by_trade_then_version(all))
    }

    async fn find_all(&self) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.lock_read()?.transactions.clone())
    }
}

#[async_trait]
impl PositionStore for MemoryStore {
    async fn find_all(&self) -> Result<Vec<Position>, StoreError> {
        Ok(self
            .lock_read()?
            .positions
            .iter()
            .map(|(code, qty)| Position::new(code.clone(), *qty))
            .collect())
    }

    async fn upsert(&self, position: &Position) -> Result<(), StoreError> {
        self.lock_write()?
            .positions
            .insert(position.security_code.clone(), position.quantity);
        Ok(())
    }

    async fn delete_by_code(&self, code: &SecurityCode) -> Result<(), StoreError> {
        self.lock_write()?.positions.remove(code);
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        self.lock_write()?.positions.clear();
        Ok(())
    }

    async fn apply(&self, diff: &PositionDiff) -> Result<(), StoreError> {
        let mut state = self.lock_write()?;
        for position in &diff.upserts {
            state
                .positions
                .insert(position.security_code.clone(), position.quantity);
        }
        for code in &diff.deletes {
            state.positions.remove(code);
        }
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn read(&self) -> Result<Option<ProcessingState>, StoreError> {
        Ok(self.lock_read()?.checkpoint.clone())
    }

    async fn write(&self, state: &ProcessingState) -> Result<(), StoreError> {
        self.lock_write()?.checkpoint = Some(state.clone());
        Ok(())
    }

}

#[async_trait]
impl StateReset for MemoryStore {
    async fn reset_all(&self) -> Result<(), StoreError> {
        let mut state = self.lock_write()?;
        state.transactions.clear();
        state.positions.clear();
        state.checkpoint = None;
        Ok(())
    }
}
