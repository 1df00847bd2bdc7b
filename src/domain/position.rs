//! Derived net positions and the recalculation checkpoint.

use crate::domain::{Decimal, SecurityCode, StoreId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Net quantity held in one security: positive = long, negative = short.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub security_code: SecurityCode,
    pub quantity: Decimal,
}

impl Position {
    pub fn new(security_code: SecurityCode, quantity: Decimal) -> Self {
        Position {
            security_code,
            quantity,
        }
    }
}

/// Key of the singleton checkpoint record.
pub const POSITION_CALCULATION_STATE_KEY: &str = "POSITION_CALCULATION";

/// How far delta recalculation has progressed through the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingState {
    pub state_key: String,
    /// Highest store id already folded into the position store.
    pub last_processed_transaction_id: StoreId,
    /// Advisory; refreshed on every advance.
    pub last_processed_timestamp: DateTime<Utc>,
}

impl ProcessingState {
    /// State before anything has been processed.
    pub fn initial() -> Self {
        Self::at(StoreId::new(0))
    }

    /// State positioned at `last_id`, stamped now.
    pub fn at(last_id: StoreId) -> Self {
        ProcessingState {
            state_key: POSITION_CALCULATION_STATE_KEY.to_string(),
            last_processed_transaction_id: last_id,
            last_processed_timestamp: Utc::now(),
        }
    }

    /// Move forward to `candidate` if it is ahead; never regresses.
    ///
    /// Returns true when the checkpoint moved.
    pub fn advance_to(&mut self, candidate: StoreId) -> bool {
        if candidate <= self.last_processed_transaction_id {
            return false;
        }
        self.last_processed_transaction_id = candidate;
        self.last_processed_timestamp = Utc::now();
        true
    }
}

impl Default for ProcessingState {
    fn default() -> Self {
        Self::initial()
    }
}
