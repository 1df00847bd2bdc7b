//! Repository layer for database operations.
//!
//! `Repository` implements the three storage traits over one SQLite pool.
//! Implementations are organized across submodules:
//! - `transactions.rs` - the versioned ledger
//! - `positions.rs` - derived net quantities
//! - `processing_state.rs` - the delta checkpoint

mod positions;
mod processing_state;
mod transactions;

use crate::domain::{
    Action, Decimal, SecurityCode, Side, StoreId, TradeId, Transaction, TransactionId,
};
use crate::store::{StateReset, StoreError};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

/// SQLite has a 999 parameter limit; IN lists are chunked to 500 for margin.
const CHUNK_SIZE: usize = 500;

const TRANSACTION_COLUMNS: &str =
    "id, transaction_id, trade_id, version, security_code, quantity, action, side";

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl StateReset for Repository {
    async fn reset_all(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for table in ["positions", "processing_state", "transactions"] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str_canonical(raw)
        .map_err(|e| StoreError::Corrupt(format!("{} '{}': {}", column, raw, e)))
}

fn transaction_from_row(row: &SqliteRow) -> Result<Transaction, StoreError> {
    let version_raw: i64 = row.try_get("version")?;
    let version = u32::try_from(version_raw)
        .map_err(|_| StoreError::Corrupt(format!("version {}", version_raw)))?;

    let quantity_raw: String = row.try_get("quantity")?;
    let action_raw: String = row.try_get("action")?;
    let side_raw: String = row.try_get("side")?;

    Ok(Transaction {
        id: StoreId::new(row.try_get("id")?),
        transaction_id: TransactionId::new(row.try_get("transaction_id")?),
        trade_id: TradeId::new(row.try_get("trade_id")?),
        version,
        security_code: SecurityCode::new(row.try_get::<String, _>("security_code")?),
        quantity: parse_decimal("quantity", &quantity_raw)?,
        action: Action::from_str(&action_raw).map_err(StoreError::Corrupt)?,
        side: Side::from_str(&side_raw).map_err(StoreError::Corrupt)?,
    })
}

fn transactions_from_rows(rows: &[SqliteRow]) -> Result<Vec<Transaction>, StoreError> {
    rows.iter().map(transaction_from_row).collect()
}

/// Map a unique-constraint violation to `Conflict`, anything else passes through.
fn conflict_or_database(err: sqlx::Error, what: impl FnOnce() -> String) -> StoreError {
    let is_unique = err
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false);
    if is_unique {
        StoreError::Conflict(what())
    } else {
        StoreError::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::domain::{NewTransaction, Position, ProcessingState};
    use crate::store::{CheckpointStore, LedgerStore, PositionStore};
    use tempfile::TempDir;

    pub(super) async fn setup_repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("ledger.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    #[test]
    fn test_parse_decimal_rejects_garbage() {
        assert_eq!(
            parse_decimal("quantity", "12.50").unwrap(),
            Decimal::from_str_canonical("12.5").unwrap()
        );
        assert!(matches!(
            parse_decimal("quantity", "abc"),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_all_empties_every_table() {
        let (repo, _dir) = setup_repo().await;
        let new = NewTransaction::new(
            TradeId::new(1),
            1,
            SecurityCode::new("REL"),
            Decimal::from(50),
            Action::Insert,
            Side::Buy,
        );
        let stored = repo.insert(TransactionId::new(1), &new).await.unwrap();
        repo.upsert(&Position::new(SecurityCode::new("REL"), Decimal::from(50)))
            .await
            .unwrap();
        repo.write(&ProcessingState::at(stored.id)).await.unwrap();

        repo.reset_all().await.unwrap();

        assert!(LedgerStore::find_all(&repo).await.unwrap().is_empty());
        assert!(PositionStore::find_all(&repo).await.unwrap().is_empty());
        assert!(repo.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_row_is_reported() {
        let (repo, _dir) = setup_repo().await;
        sqlx::query(
            r#"
            INSERT INTO transactions (
                transaction_id, trade_id, version, security_code,
                quantity, action, side, created_at
            ) VALUES (1, 1, 1, 'REL', 'not-a-number', 'INSERT', 'BUY', 0)
            "#,
        )
        .execute(repo.pool())
        .await
        .unwrap();

        let rows = sqlx::query(&format!("SELECT {} FROM transactions", TRANSACTION_COLUMNS))
            .fetch_all(repo.pool())
            .await
            .unwrap();
        assert!(matches!(
            transactions_from_rows(&rows),
            Err(StoreError::Corrupt(_))
        ));
    }
}
