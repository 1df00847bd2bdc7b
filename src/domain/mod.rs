//! Domain types for the position ledger.
//!
//! This module provides:
//! - Lossless quantity handling via a Decimal wrapper
//! - Identifier newtypes and the Side/Action enums
//! - Versioned Transaction records and submission payloads
//! - Position and ProcessingState (checkpoint) records

pub mod decimal;
pub mod position;
pub mod primitives;
pub mod transaction;

pub use decimal::Decimal;
pub use position::{Position, ProcessingState, POSITION_CALCULATION_STATE_KEY};
pub use primitives::{Action, SecurityCode, Side, StoreId, TradeId, TransactionId};
pub use transaction::{
    InvalidTransaction, NewTransaction, Transaction, TransactionView, MAX_QUANTITY,
};
