//! Ledger database setup: connection options and the embedded schema.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA: &str = include_str!("schema.sql");

/// Writers wait this long for the lock instead of failing with SQLITE_BUSY.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (creating if needed) the ledger database and apply the schema.
///
/// Every pooled connection runs in WAL mode with `synchronous = NORMAL`, so
/// position reads do not block behind the single writer.
///
/// # Errors
/// Returns an error if the parent directory cannot be created, the file cannot
/// be opened, or a schema statement fails.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    apply_schema(&pool).await?;

    info!(path = db_path, "Ledger database ready");
    Ok(pool)
}

/// Statements of the embedded schema, in file order.
fn schema_statements() -> impl Iterator<Item = &'static str> {
    SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty())
}

/// Every statement is `IF NOT EXISTS`, so reopening an existing file is safe.
async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut applied = 0;
    for statement in schema_statements() {
        sqlx::query(statement).execute(pool).await?;
        applied += 1;
    }
    debug!(statements = applied, "Ledger schema applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_temp() -> (SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("nested")
            .join("ledger.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        assert!(Path::new(&db_path).exists());
        (pool, temp_dir)
    }

    #[test]
    fn test_schema_statements_are_all_idempotent() {
        let statements: Vec<&str> = schema_statements().collect();
        assert_eq!(statements.len(), 5);
        assert!(statements.iter().all(|s| s.contains("IF NOT EXISTS")));
    }

    #[tokio::test]
    async fn test_schema_creates_ledger_tables_and_indexes() {
        let (pool, _dir) = open_temp().await;

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(names, vec!["positions", "processing_state", "transactions"]);

        apply_schema(&pool).await.expect("reapplying schema failed");
        let indexes: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name LIKE 'idx_transactions_%'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(indexes.0, 2);
    }

    #[tokio::test]
    async fn test_connection_settings() {
        let (pool, _dir) = open_temp().await;

        let (journal_mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(journal_mode, "wal");

        let (synchronous,): (i64,) = sqlx::query_as("PRAGMA synchronous")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(synchronous, 1);

        let (timeout_ms,): (i64,) = sqlx::query_as("PRAGMA busy_timeout")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(timeout_ms, 5000);
    }

    #[tokio::test]
    async fn test_store_ids_never_reused_after_delete() {
        let (pool, _dir) = open_temp().await;
        let insert = "INSERT INTO transactions \
            (transaction_id, trade_id, version, security_code, quantity, action, side, created_at) \
            VALUES (1, 1, 1, 'REL', '50', 'INSERT', 'BUY', 0)";

        let first = sqlx::query(insert).execute(&pool).await.unwrap();
        sqlx::query("DELETE FROM transactions")
            .execute(&pool)
            .await
            .unwrap();
        let second = sqlx::query(insert).execute(&pool).await.unwrap();

        assert!(second.last_insert_rowid() > first.last_insert_rowid());
    }

    #[tokio::test]
    async fn test_checks_reject_bad_rows() {
        let (pool, _dir) = open_temp().await;
        let insert = |version: i64, action: &'static str| {
            sqlx::query(
                "INSERT INTO transactions \
                 (transaction_id, trade_id, version, security_code, quantity, action, side, created_at) \
                 VALUES (?, 1, ?, 'REL', '50', ?, 'BUY', 0)",
            )
            .bind(version)
            .bind(version)
            .bind(action)
        };

        assert!(insert(0, "INSERT").execute(&pool).await.is_err());
        assert!(insert(1, "DELETE").execute(&pool).await.is_err());
        assert!(insert(2, "CANCEL").execute(&pool).await.is_ok());
    }

    #[tokio::test]
    async fn test_checkpoint_row_is_keyed_by_state() {
        let (pool, _dir) = open_temp().await;
        let upsert = "INSERT INTO processing_state \
            (state_key, last_processed_transaction_id, last_processed_timestamp) \
            VALUES ('POSITION_CALCULATION', ?, 0) \
            ON CONFLICT(state_key) DO UPDATE SET \
            last_processed_transaction_id = excluded.last_processed_transaction_id";

        for id in [3_i64, 7] {
            sqlx::query(upsert).bind(id).execute(&pool).await.unwrap();
        }

        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT state_key, last_processed_transaction_id FROM processing_state",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(rows, vec![("POSITION_CALCULATION".to_string(), 7)]);
    }
}
