pub mod sample_data;
pub mod service;

pub use sample_data::sample_transactions;
pub use service::{LedgerService, ServiceError};
