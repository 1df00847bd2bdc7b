use super::resolver::latest_version;
use crate::domain::{NewTransaction, TradeId, Transaction, TransactionId};
use crate::store::{LedgerStore, StoreError};
use thiserror::Error;

/// An edit aimed at a version that is no longer its trade's latest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Cannot edit transaction {transaction_id} (version {attempted_version}) for trade {trade_id}. \
     Only the latest transaction version {latest_version} can be edited."
)]
pub struct EditRejection {
    pub transaction_id: TransactionId,
    pub trade_id: TradeId,
    pub attempted_version: u32,
    pub latest_version: u32,
    pub latest_transaction_id: TransactionId,
}

/// Outcome of checking a submission against the stored ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditDecision {
    /// No stored record carries the incoming transaction id.
    New,
    /// The incoming id is its trade's latest version; overwrite in place.
    EditLatest { existing: Transaction },
    /// The incoming id is an older version.
    Rejected(EditRejection),
}

/// Classify a stored record against all versions of its trade.
///
/// `existing` is the record currently holding the incoming transaction id,
/// `trade_versions` every stored version of `existing`'s trade.
pub fn classify(existing: Option<&Transaction>, trade_versions: &[Transaction]) -> EditDecision {
    let Some(existing) = existing else {
        return EditDecision::New;
    };

    match latest_version(trade_versions) {
        Some(latest) if latest.transaction_id != existing.transaction_id => {
            EditDecision::Rejected(EditRejection {
                transaction_id: existing.transaction_id,
                trade_id: existing.trade_id,
                attempted_version: existing.version,
                latest_version: latest.version,
                latest_transaction_id: latest.transaction_id,
            })
        }
        _ => EditDecision::EditLatest {
            existing: existing.clone(),
        },
    }
}

/// Gate that lets edits through only against a trade's latest version.
///
/// Reads the ledger, never writes it.
pub struct EditValidator;

impl EditValidator {
    /// # Errors
    /// Returns an error if the ledger cannot be read.
    pub async fn validate(
        ledger: &dyn LedgerStore,
        incoming: &NewTransaction,
    ) -> Result<EditDecision, StoreError> {
        let Some(transaction_id) = incoming.transaction_id else {
            return Ok(EditDecision::New);
        };

        let Some(existing) = ledger.find_by_transaction_id(transaction_id).await? else {
            return Ok(EditDecision::New);
        };

        let versions = ledger.find_by_trade_id(existing.trade_id).await?;
        Ok(classify(Some(&existing), &versions))
    }
}
