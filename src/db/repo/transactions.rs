//! Ledger operations for the repository.

use super::{
    conflict_or_database, transaction_from_row, transactions_from_rows, Repository, CHUNK_SIZE,
    TRANSACTION_COLUMNS,
};
use crate::domain::{
    NewTransaction, SecurityCode, StoreId, TradeId, Transaction, TransactionId,
};
use crate::store::{LedgerStore, StoreError};
use async_trait::async_trait;
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;
use std::collections::BTreeSet;

const INSERT_SQL: &str = r#"
    INSERT INTO transactions (
        transaction_id, trade_id, version, security_code,
        quantity, action, side, created_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

async fn insert_one(
    conn: &mut SqliteConnection,
    transaction_id: TransactionId,
    tx: &NewTransaction,
    created_at: i64,
) -> Result<Transaction, StoreError> {
    let result = sqlx::query(INSERT_SQL)
        .bind(transaction_id.as_i64())
        .bind(tx.trade_id.as_i64())
        .bind(i64::from(tx.version))
        .bind(tx.security_code.as_str())
        .bind(tx.quantity.to_canonical_string())
        .bind(tx.action.as_str())
        .bind(tx.side.as_str())
        .bind(created_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            conflict_or_database(e, || {
                format!("transaction id {} already exists", transaction_id)
            })
        })?;

    Ok(Transaction::from_new(
        StoreId::new(result.last_insert_rowid()),
        transaction_id,
        tx,
    ))
}

impl Repository {
    async fn fetch_transactions(&self, sql: &str) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        transactions_from_rows(&rows)
    }
}

#[async_trait]
impl LedgerStore for Repository {
    async fn insert(
        &self,
        transaction_id: TransactionId,
        tx: &NewTransaction,
    ) -> Result<Transaction, StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_one(
            &mut *conn,
            transaction_id,
            tx,
            chrono::Utc::now().timestamp_millis(),
        )
        .await
    }

    async fn insert_batch(
        &self,
        batch: &[(TransactionId, NewTransaction)],
    ) -> Result<Vec<Transaction>, StoreError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let created_at = chrono::Utc::now().timestamp_millis();
        let mut stored = Vec::with_capacity(batch.len());

        // Dropping the transaction on error rolls the whole batch back.
        let mut tx = self.pool.begin().await?;
        for (transaction_id, new) in batch {
            stored.push(insert_one(&mut *tx, *transaction_id, new, created_at).await?);
        }
        tx.commit().await?;

        Ok(stored)
    }

    async fn update_in_place(
        &self,
        existing: StoreId,
        new: &NewTransaction,
    ) -> Result<Transaction, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET trade_id = ?, version = ?, security_code = ?, quantity = ?, action = ?, side = ?
            WHERE id = ?
            "#,
        )
        .bind(new.trade_id.as_i64())
        .bind(i64::from(new.version))
        .bind(new.security_code.as_str())
        .bind(new.quantity.to_canonical_string())
        .bind(new.action.as_str())
        .bind(new.side.as_str())
        .bind(existing.as_i64())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("transaction row {}", existing)));
        }

        let row = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE id = ?",
            TRANSACTION_COLUMNS
        ))
        .bind(existing.as_i64())
        .fetch_one(&mut *tx)
        .await?;
        let updated = transaction_from_row(&row)?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE transaction_id = ?",
            TRANSACTION_COLUMNS
        ))
        .bind(transaction_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn exists_by_transaction_id(
        &self,
        transaction_id: TransactionId,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM transactions WHERE transaction_id = ? LIMIT 1")
            .bind(transaction_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn find_by_trade_id(&self, trade_id: TradeId) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE trade_id = ? ORDER BY version ASC, id ASC",
            TRANSACTION_COLUMNS
        ))
        .bind(trade_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        transactions_from_rows(&rows)
    }

    async fn find_by_trade_ids(
        &self,
        trade_ids: &[TradeId],
    ) -> Result<Vec<Transaction>, StoreError> {
        if trade_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        for chunk in trade_ids.chunks(CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                r#"
                SELECT {}
                FROM transactions
                WHERE trade_id IN ({})
                "#,
                TRANSACTION_COLUMNS, placeholders
            );

            let mut query = sqlx::query(&sql);
            for trade_id in chunk {
                query = query.bind(trade_id.as_i64());
            }

            let rows = query.fetch_all(&self.pool).await?;
            out.extend(transactions_from_rows(&rows)?);
        }

        // Chunks may interleave trades; restore (trade_id, version) order.
        out.sort_by(|a, b| {
            a.trade_id
                .cmp(&b.trade_id)
                .then_with(|| a.version.cmp(&b.version))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(out)
    }

    async fn find_max_transaction_id(&self) -> Result<Option<TransactionId>, StoreError> {
        let row = sqlx::query("SELECT MAX(transaction_id) AS max_id FROM transactions")
            .fetch_one(&self.pool)
            .await?;
        let max: Option<i64> = row.try_get("max_id")?;
        Ok(max.map(TransactionId::new))
    }

    async fn find_with_id_greater_than(
        &self,
        after: StoreId,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE id > ? ORDER BY id ASC",
            TRANSACTION_COLUMNS
        ))
        .bind(after.as_i64())
        .fetch_all(&self.pool)
        .await?;
        transactions_from_rows(&rows)
    }

    async fn find_trade_ids_for_security_codes(
        &self,
        codes: &[SecurityCode],
    ) -> Result<Vec<TradeId>, StoreError> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }

        let mut out: BTreeSet<TradeId> = BTreeSet::new();
        for chunk in codes.chunks(CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                r#"
                SELECT DISTINCT trade_id
                FROM transactions
                WHERE security_code IN ({})
                "#,
                placeholders
            );

            let mut query = sqlx::query(&sql);
            for code in chunk {
                query = query.bind(code.as_str());
            }

            let rows = query.fetch_all(&self.pool).await?;
            for row in &rows {
                out.insert(TradeId::new(row.try_get("trade_id")?));
            }
        }

        Ok(out.into_iter().collect())
    }

    async fn find_all_grouped_by_trade_then_version(&self) -> Result<Vec<Transaction>, StoreError> {
        self.fetch_transactions(&format!(
            "SELECT {} FROM transactions ORDER BY trade_id ASC, version ASC, id ASC",
            TRANSACTION_COLUMNS
        ))
        .await
    }

    async fn find_all(&self) -> Result<Vec<Transaction>, StoreError> {
        self.fetch_transactions(&format!(
            "SELECT {} FROM transactions ORDER BY id ASC",
            TRANSACTION_COLUMNS
        ))
        .await
    }
}
