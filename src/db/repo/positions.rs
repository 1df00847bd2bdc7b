//! Derived position operations for the repository.

use super::{parse_decimal, Repository};
use crate::domain::{Position, SecurityCode};
use crate::store::{PositionDiff, PositionStore, StoreError};
use async_trait::async_trait;
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

const UPSERT_SQL: &str = r#"
    INSERT INTO positions (security_code, quantity, updated_at)
    VALUES (?, ?, ?)
    ON CONFLICT(security_code) DO UPDATE SET
        quantity = excluded.quantity,
        updated_at = excluded.updated_at
"#;

async fn upsert_one(
    conn: &mut SqliteConnection,
    position: &Position,
    updated_at: i64,
) -> Result<(), StoreError> {
    sqlx::query(UPSERT_SQL)
        .bind(position.security_code.as_str())
        .bind(position.quantity.to_canonical_string())
        .bind(updated_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn delete_one(conn: &mut SqliteConnection, code: &SecurityCode) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM positions WHERE security_code = ?")
        .bind(code.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[async_trait]
impl PositionStore for Repository {
    async fn find_all(&self) -> Result<Vec<Position>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT security_code, quantity
            FROM positions
            ORDER BY security_code ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Position, StoreError> {
                let quantity_raw: String = row.try_get("quantity")?;
                Ok(Position::new(
                    SecurityCode::new(row.try_get::<String, _>("security_code")?),
                    parse_decimal("quantity", &quantity_raw)?,
                ))
            })
            .collect()
    }

    async fn upsert(&self, position: &Position) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        upsert_one(&mut *conn, position, chrono::Utc::now().timestamp_millis()).await
    }

    async fn delete_by_code(&self, code: &SecurityCode) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        delete_one(&mut *conn, code).await
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM positions")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Upserts and deletes commit together or not at all.
    async fn apply(&self, diff: &PositionDiff) -> Result<(), StoreError> {
        if diff.is_empty() {
            return Ok(());
        }

        let updated_at = chrono::Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        for position in &diff.upserts {
            upsert_one(&mut *tx, position, updated_at).await?;
        }
        for code in &diff.deletes {
            delete_one(&mut *tx, code).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
