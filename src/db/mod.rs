//! SQLite persistence for the ledger.
//!
//! - `migrations`: opening the database file and applying the ledger schema
//! - `repo`: `Repository`, the SQLite implementation of the storage traits

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::Repository;
