//! Checkpoint operations for the repository.

use super::Repository;
use crate::domain::{ProcessingState, StoreId, POSITION_CALCULATION_STATE_KEY};
use crate::store::{CheckpointStore, StoreError};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sqlx::Row;

#[async_trait]
impl CheckpointStore for Repository {
    async fn read(&self) -> Result<Option<ProcessingState>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT state_key, last_processed_transaction_id, last_processed_timestamp
            FROM processing_state
            WHERE state_key = ?
            "#,
        )
        .bind(POSITION_CALCULATION_STATE_KEY)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let timestamp_ms: i64 = row.try_get("last_processed_timestamp")?;
        let last_processed_timestamp = Utc
            .timestamp_millis_opt(timestamp_ms)
            .single()
            .ok_or_else(|| StoreError::Corrupt(format!("checkpoint timestamp {}", timestamp_ms)))?;

        Ok(Some(ProcessingState {
            state_key: row.try_get("state_key")?,
            last_processed_transaction_id: StoreId::new(
                row.try_get("last_processed_transaction_id")?,
            ),
            last_processed_timestamp,
        }))
    }

    async fn write(&self, state: &ProcessingState) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO processing_state (
                state_key, last_processed_transaction_id, last_processed_timestamp
            ) VALUES (?, ?, ?)
            ON CONFLICT(state_key) DO UPDATE SET
                last_processed_transaction_id = excluded.last_processed_transaction_id,
                last_processed_timestamp = excluded.last_processed_timestamp
            "#,
        )
        .bind(state.state_key.as_str())
        .bind(state.last_processed_transaction_id.as_i64())
        .bind(state.last_processed_timestamp.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
