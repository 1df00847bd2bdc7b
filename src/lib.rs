pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod recalc;
pub mod store;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Action, Decimal, NewTransaction, Position, ProcessingState, SecurityCode, Side, StoreId,
    TradeId, Transaction, TransactionId, TransactionView,
};
pub use error::AppError;
pub use orchestration::{LedgerService, ServiceError};
pub use recalc::Recalculator;
pub use store::{
    CheckpointStore, LedgerStore, MemoryStore, PositionStore, StateReset, StoreError, Stores,
};
