//! Storage abstractions for the ledger, derived positions, and the checkpoint.
//!
//! The recalculation engine only talks to these traits. Implementations:
//! - `Repository` (SQLite, in `crate::db`)
//! - `MemoryStore` (in-process, for tests and ephemeral runs)

use crate::domain::{
    NewTransaction, Position, ProcessingState, SecurityCode, StoreId, TradeId, Transaction,
    TransactionId,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub mod memory;

pub use memory::MemoryStore;

/// Error type for storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A stored row could not be decoded into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable store of versioned transactions.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append one transaction, returning it with its assigned store id.
    async fn insert(
        &self,
        transaction_id: TransactionId,
        tx: &NewTransaction,
    ) -> Result<Transaction, StoreError>;

    /// Append a batch all-or-nothing, in order.
    async fn insert_batch(
        &self,
        batch: &[(TransactionId, NewTransaction)],
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Overwrite the row with store id `existing` keeping its ids.
    async fn update_in_place(
        &self,
        existing: StoreId,
        tx: &NewTransaction,
    ) -> Result<Transaction, StoreError>;

    async fn find_by_transaction_id(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<Transaction>, StoreError>;

    async fn exists_by_transaction_id(
        &self,
        transaction_id: TransactionId,
    ) -> Result<bool, StoreError> {
        Ok(self.find_by_transaction_id(transaction_id).await?.is_some())
    }

    /// All versions of one trade, version ascending.
    async fn find_by_trade_id(&self, trade_id: TradeId) -> Result<Vec<Transaction>, StoreError>;

    /// All versions of the given trades, ordered by (trade_id, version).
    async fn find_by_trade_ids(
        &self,
        trade_ids: &[TradeId],
    ) -> Result<Vec<Transaction>, StoreError>;

    async fn find_max_transaction_id(&self) -> Result<Option<TransactionId>, StoreError>;

    /// Rows with store id strictly greater than `after`, id ascending.
    async fn find_with_id_greater_than(
        &self,
        after: StoreId,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Distinct trades having any version on one of `codes`, ascending.
    async fn find_trade_ids_for_security_codes(
        &self,
        codes: &[SecurityCode],
    ) -> Result<Vec<TradeId>, StoreError>;

    /// Every row ordered by (trade_id, version).
    async fn find_all_grouped_by_trade_then_version(&self) -> Result<Vec<Transaction>, StoreError>;

    /// Every row in ingestion order.
    async fn find_all(&self) -> Result<Vec<Transaction>, StoreError>;
}

/// Changes computed by a recalculation, applied as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionDiff {
    pub upserts: Vec<Position>,
    pub deletes: Vec<SecurityCode>,
}

impl PositionDiff {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

/// Durable map from security code to net quantity.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// All positions, security code ascending.
    async fn find_all(&self) -> Result<Vec<Position>, StoreError>;

    async fn upsert(&self, position: &Position) -> Result<(), StoreError>;

    async fn delete_by_code(&self, code: &SecurityCode) -> Result<(), StoreError>;

    async fn delete_all(&self) -> Result<(), StoreError>;

    /// Apply a diff. Implementations with transactions make this atomic.
    async fn apply(&self, diff: &PositionDiff) -> Result<(), StoreError> {
        for position in &diff.upserts {
            self.upsert(position).await?;
        }
        for code in &diff.deletes {
            self.delete_by_code(code).await?;
        }
        Ok(())
    }
}

/// Durable singleton checkpoint record.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn read(&self) -> Result<Option<ProcessingState>, StoreError>;

    async fn write(&self, state: &ProcessingState) -> Result<(), StoreError>;
}

/// Wipes ledger, positions and checkpoint together.
#[async_trait]
pub trait StateReset: Send + Sync {
    /// Either everything is gone afterwards or nothing changed. Store ids
    /// keep increasing past the deleted rows.
    async fn reset_all(&self) -> Result<(), StoreError>;
}

/// The collaborators the engine reads and writes.
#[derive(Clone)]
pub struct Stores {
    pub ledger: Arc<dyn LedgerStore>,
    pub positions: Arc<dyn PositionStore>,
    pub checkpoint: Arc<dyn CheckpointStore>,
    pub reset: Arc<dyn StateReset>,
}

impl Stores {
    /// Use one object for every role.
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: LedgerStore + PositionStore + CheckpointStore + StateReset + 'static,
    {
        Stores {
            ledger: store.clone(),
            positions: store.clone(),
            checkpoint: store.clone(),
            reset: store,
        }
    }

    pub fn in_memory() -> Self {
        Self::from_shared(Arc::new(MemoryStore::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Decimal;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Corrupt("quantity 'abc'".to_string());
        assert_eq!(err.to_string(), "corrupt row: quantity 'abc'");

        let err = StoreError::Conflict("transaction id 4 already exists".to_string());
        assert_eq!(
            err.to_string(),
            "conflict: transaction id 4 already exists"
        );
    }

    #[test]
    fn test_position_diff_is_empty() {
        let mut diff = PositionDiff::default();
        assert!(diff.is_empty());
        diff.deletes.push(SecurityCode::new("ITC"));
        assert!(!diff.is_empty());
        diff.deletes.clear();
        diff.upserts
            .push(Position::new(SecurityCode::new("REL"), Decimal::from(1)));
        assert!(!diff.is_empty());
    }
}
