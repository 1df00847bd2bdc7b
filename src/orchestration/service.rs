use crate::domain::{
    InvalidTransaction, NewTransaction, Position, ProcessingState, Transaction, TransactionId,
    TransactionView,
};
use crate::engine::{group_by_trade, latest_version, EditDecision, EditRejection, EditValidator};
use crate::orchestration::sample_data::sample_transactions;
use crate::recalc::Recalculator;
use crate::store::{StoreError, Stores};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Entry point for every ledger read and write.
///
/// All writes (ledger, positions, checkpoint) run under one writer lock, held
/// from validation until the recalculation has been persisted. Position reads
/// do not take it.
pub struct LedgerService {
    recalculator: Recalculator,
    write_lock: Mutex<()>,
}

impl LedgerService {
    pub fn new(stores: Stores) -> Self {
        Self {
            recalculator: Recalculator::new(stores),
            write_lock: Mutex::new(()),
        }
    }

    pub fn stores(&self) -> &Stores {
        self.recalculator.stores()
    }

    /// Insert a new transaction or edit the latest version of a trade.
    ///
    /// New records are folded in by a delta recalculation. Accepted edits
    /// overwrite the stored row and re-derive the securities it affected; if
    /// that re-derivation fails the row is restored.
    ///
    /// # Errors
    /// `Rejected` when editing a non-latest version (nothing is written),
    /// `InvalidInput` for malformed fields, `Storage` on store failure.
    pub async fn submit_transaction(
        &self,
        incoming: NewTransaction,
    ) -> Result<Vec<Position>, ServiceError> {
        incoming.validate()?;
        info!(
            trade_id = %incoming.trade_id,
            version = incoming.version,
            security = %incoming.security_code,
            quantity = %incoming.quantity,
            "Processing transaction"
        );

        let _guard = self.write_lock.lock().await;
        let ledger = self.stores().ledger.as_ref();

        match EditValidator::validate(ledger, &incoming).await? {
            EditDecision::Rejected(rejection) => {
                warn!(
                    transaction_id = %rejection.transaction_id,
                    trade_id = %rejection.trade_id,
                    latest_version = rejection.latest_version,
                    "Rejected edit of stale transaction version"
                );
                Err(ServiceError::Rejected(rejection))
            }
            EditDecision::EditLatest { existing } => {
                let updated = ledger.update_in_place(existing.id, &incoming).await?;
                info!(
                    transaction_id = %updated.transaction_id,
                    previous_security = %existing.security_code,
                    security = %updated.security_code,
                    "Edited latest transaction version in place"
                );
                match self
                    .recalculator
                    .recalculate_after_edit(&existing, &updated)
                    .await
                {
                    Ok(positions) => Ok(positions),
                    Err(e) => {
                        self.revert_edit(&existing, &updated).await;
                        Err(e.into())
                    }
                }
            }
            EditDecision::New => {
                let transaction_id = match incoming.transaction_id {
                    Some(id) => id,
                    None => next_transaction_id(ledger.find_max_transaction_id().await?)?,
                };
                let stored = ledger.insert(transaction_id, &incoming).await?;
                info!(
                    id = %stored.id,
                    transaction_id = %stored.transaction_id,
                    "Inserted transaction"
                );
                Ok(self.recalculator.recalculate_delta().await?)
            }
        }
    }

    /// Persist a batch all-or-nothing, then run one delta recalculation.
    ///
    /// Entries without a transaction id get a contiguous block of ids above
    /// every id already stored or supplied in the batch.
    ///
    /// # Errors
    /// `InvalidInput` if any entry is malformed or reuses a transaction id;
    /// `Storage` on store failure (no entry is persisted).
    pub async fn submit_batch(
        &self,
        batch: Vec<NewTransaction>,
    ) -> Result<Vec<Position>, ServiceError> {
        let _guard = self.write_lock.lock().await;
        self.ingest_batch_locked(batch).await
    }

    /// Hand a batch to a worker task; the result resolves through the handle.
    pub fn spawn_batch(
        self: &Arc<Self>,
        batch: Vec<NewTransaction>,
    ) -> JoinHandle<Result<Vec<Position>, ServiceError>> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let result = service.submit_batch(batch).await;
            if let Err(e) = &result {
                error!(error = %e, "Batch ingestion failed");
            }
            result
        })
    }

    /// Current positions, security code ascending.
    pub async fn positions(&self) -> Result<Vec<Position>, ServiceError> {
        Ok(self.stores().positions.find_all().await?)
    }

    /// Every stored transaction in ingestion order, flagged with whether it is
    /// its trade's latest version.
    pub async fn transactions(&self) -> Result<Vec<TransactionView>, ServiceError> {
        let rows = self.stores().ledger.find_all().await?;

        let latest: HashSet<TransactionId> = group_by_trade(rows.clone())
            .values()
            .filter_map(|versions| latest_version(versions))
            .map(|t| t.transaction_id)
            .collect();

        Ok(rows
            .into_iter()
            .map(|transaction| TransactionView {
                is_latest_version: latest.contains(&transaction.transaction_id),
                transaction,
            })
            .collect())
    }

    pub async fn processing_state(&self) -> Result<ProcessingState, ServiceError> {
        Ok(self.recalculator.processing_state().await?)
    }

    /// Rebuild positions from the whole ledger.
    pub async fn force_full_recalculation(&self) -> Result<Vec<Position>, ServiceError> {
        let _guard = self.write_lock.lock().await;
        info!("Forcing full recalculation");
        Ok(self.recalculator.recalculate_all().await?)
    }

    /// Delete all transactions, positions and the checkpoint.
    pub async fn clear_all(&self) -> Result<(), ServiceError> {
        let _guard = self.write_lock.lock().await;
        self.clear_locked().await
    }

    /// Replace all state with the built-in sample batch.
    pub async fn load_sample_data(&self) -> Result<Vec<Position>, ServiceError> {
        let _guard = self.write_lock.lock().await;
        self.clear_locked().await?;
        self.ingest_batch_locked(sample_transactions()).await
    }

    /// Put `previous` back after its edit could not be folded into positions.
    ///
    /// The edited row sits at or below the checkpoint, so no later delta would
    /// pick it up. Caller holds `write_lock`.
    async fn revert_edit(&self, previous: &Transaction, edited: &Transaction) {
        let ledger = self.stores().ledger.as_ref();
        let restored = match ledger.update_in_place(previous.id, &previous.to_new()).await {
            Ok(restored) => restored,
            Err(e) => {
                error!(
                    transaction_id = %previous.transaction_id,
                    error = %e,
                    "Could not revert edit; positions are stale until a full recalculation"
                );
                return;
            }
        };

        match self
            .recalculator
            .recalculate_after_edit(edited, &restored)
            .await
        {
            Ok(_) => warn!(
                transaction_id = %previous.transaction_id,
                "Reverted edit after its recalculation failed"
            ),
            Err(e) => error!(
                transaction_id = %previous.transaction_id,
                error = %e,
                "Reverted edit but could not re-derive positions; run a full recalculation"
            ),
        }
    }

    /// Caller holds `write_lock`.
    async fn clear_locked(&self) -> Result<(), ServiceError> {
        self.stores().reset.reset_all().await?;
        info!("Cleared all ledger state");
        Ok(())
    }

    /// Caller holds `write_lock`.
    async fn ingest_batch_locked(
        &self,
        batch: Vec<NewTransaction>,
    ) -> Result<Vec<Position>, ServiceError> {
        for tx in &batch {
            tx.validate()?;
        }
        info!(count = batch.len(), "Processing transactions in bulk");

        let ledger = self.stores().ledger.as_ref();
        let mut supplied = HashSet::new();
        for id in batch.iter().filter_map(|t| t.transaction_id) {
            if !supplied.insert(id) {
                return Err(ServiceError::InvalidInput(format!(
                    "transaction id {} appears more than once in the batch",
                    id
                )));
            }
            if ledger.exists_by_transaction_id(id).await? {
                return Err(ServiceError::InvalidInput(format!(
                    "transaction id {} already exists; edit it with a single submission",
                    id
                )));
            }
        }

        let stored_max = ledger.find_max_transaction_id().await?;
        let assigned = assign_batch_ids(batch, stored_max)?;
        if !assigned.is_empty() {
            let stored = ledger.insert_batch(&assigned).await?;
            info!(inserted = stored.len(), "Persisted transaction batch");
        }

        Ok(self.recalculator.recalculate_delta().await?)
    }
}

fn next_transaction_id(max: Option<TransactionId>) -> Result<TransactionId, ServiceError> {
    match max {
        None => Ok(TransactionId::new(1)),
        Some(id) => id.checked_next().ok_or_else(|| {
            ServiceError::InvalidInput(format!(
                "no transaction id left after {}; supply one explicitly",
                id
            ))
        }),
    }
}

/// Pair every entry with its transaction id, generating missing ones in order.
///
/// Fails without assigning anything when the generated block would run past
/// `i64::MAX`.
fn assign_batch_ids(
    batch: Vec<NewTransaction>,
    stored_max: Option<TransactionId>,
) -> Result<Vec<(TransactionId, NewTransaction)>, ServiceError> {
    let supplied_max = batch.iter().filter_map(|t| t.transaction_id).max();
    let mut last = stored_max.max(supplied_max);
    batch
        .into_iter()
        .map(|tx| match tx.transaction_id {
            Some(id) => Ok((id, tx)),
            None => {
                let id = next_transaction_id(last)?;
                last = Some(id);
                Ok((id, tx))
            }
        })
        .collect()
}

/// Failures surfaced by the ledger service.
///
/// `Rejected` and `InvalidInput` mean "fix the input"; `Storage` and `Worker`
/// mean "retry later".
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Rejected(#[from] EditRejection),
    #[error("Invalid transaction: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("Batch worker failed: {0}")]
    Worker(String),
}

impl From<InvalidTransaction> for ServiceError {
    fn from(err: InvalidTransaction) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}

impl ServiceError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ServiceError::Rejected(_) | ServiceError::InvalidInput(_))
    }
}
