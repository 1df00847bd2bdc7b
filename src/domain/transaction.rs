//! Versioned trade transactions.

use crate::domain::{Action, Decimal, SecurityCode, Side, StoreId, TradeId, TransactionId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest quantity a single transaction may carry.
///
/// Keeps any realistic sum of signed quantities inside `Decimal`'s range.
pub const MAX_QUANTITY: i64 = 1_000_000_000_000_000;

/// One stored version of one trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Store-assigned ingestion sequence.
    pub id: StoreId,
    pub transaction_id: TransactionId,
    pub trade_id: TradeId,
    /// Revision counter; the maximum per trade is authoritative.
    pub version: u32,
    pub security_code: SecurityCode,
    /// Non-negative magnitude.
    pub quantity: Decimal,
    pub action: Action,
    pub side: Side,
}

impl Transaction {
    /// Build the stored form of a submission once both ids are known.
    pub fn from_new(id: StoreId, transaction_id: TransactionId, new: &NewTransaction) -> Self {
        Transaction {
            id,
            transaction_id,
            trade_id: new.trade_id,
            version: new.version,
            security_code: new.security_code.clone(),
            quantity: new.quantity,
            action: new.action,
            side: new.side,
        }
    }

    /// The submission that reproduces this row, targeting its transaction id.
    pub fn to_new(&self) -> NewTransaction {
        NewTransaction {
            transaction_id: Some(self.transaction_id),
            trade_id: self.trade_id,
            version: self.version,
            security_code: self.security_code.clone(),
            quantity: self.quantity,
            action: self.action,
            side: self.side,
        }
    }

    /// Quantity signed by side: Buy = +quantity, Sell = -quantity.
    pub fn signed_quantity(&self) -> Decimal {
        match self.side {
            Side::Buy => self.quantity,
            Side::Sell => -self.quantity,
        }
    }

    pub fn is_cancel(&self) -> bool {
        self.action == Action::Cancel
    }
}

/// A submitted transaction, before the store assigns its sequence id.
///
/// `transaction_id` is optional: absent means a brand new record whose id the
/// engine generates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
    pub trade_id: TradeId,
    pub version: u32,
    pub security_code: SecurityCode,
    pub quantity: Decimal,
    pub action: Action,
    pub side: Side,
}

impl NewTransaction {
    pub fn new(
        trade_id: TradeId,
        version: u32,
        security_code: SecurityCode,
        quantity: Decimal,
        action: Action,
        side: Side,
    ) -> Self {
        NewTransaction {
            transaction_id: None,
            trade_id,
            version,
            security_code,
            quantity,
            action,
            side,
        }
    }

    /// Target an existing (or client-chosen) transaction id.
    pub fn with_transaction_id(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    /// Check field-level constraints.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), InvalidTransaction> {
        if self.version == 0 {
            return Err(InvalidTransaction::ZeroVersion {
                trade_id: self.trade_id,
            });
        }
        if self.quantity.is_negative() {
            return Err(InvalidTransaction::NegativeQuantity {
                trade_id: self.trade_id,
                quantity: self.quantity,
            });
        }
        if self.quantity > Decimal::from(MAX_QUANTITY) {
            return Err(InvalidTransaction::QuantityTooLarge {
                trade_id: self.trade_id,
                quantity: self.quantity,
            });
        }
        if self.security_code.as_str().trim().is_empty() {
            return Err(InvalidTransaction::EmptySecurityCode {
                trade_id: self.trade_id,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTransaction {
    #[error("trade {trade_id}: version must be a positive integer")]
    ZeroVersion { trade_id: TradeId },
    #[error("trade {trade_id}: quantity must be non-negative, got {quantity}")]
    NegativeQuantity { trade_id: TradeId, quantity: Decimal },
    #[error("trade {trade_id}: quantity {quantity} exceeds the maximum of {max}", max = MAX_QUANTITY)]
    QuantityTooLarge { trade_id: TradeId, quantity: Decimal },
    #[error("trade {trade_id}: security code must not be empty")]
    EmptySecurityCode { trade_id: TradeId },
}

/// A stored transaction annotated with whether it is its trade's latest version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub is_latest_version: bool,
}
