// Schema and mirroring logic for `log.db` (spec.md §3 `LogRecord(X)`,
// §4.1 "every write to the operational store is mirrored"). The log
// database only ever grows: nothing here is updated or deleted.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{to_rfc3339, LogRecordRow};
use leantask_contracts::{LogRecord, StoreError};

pub(crate) async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS log_records (
            id          TEXT PRIMARY KEY,
            entity      TEXT NOT NULL,
            ref_id      TEXT NOT NULL,
            payload     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_log_records_ref_id ON log_records(entity, ref_id)")
        .execute(pool)
        .await?;
    Ok(())
}

/// Append one entry per write, tagged with the entity name and the id of
/// the row that changed. `payload` is whatever the caller considers worth
/// keeping a durable history of (typically the full row, serialized).
pub(crate) async fn append(
    pool: &SqlitePool,
    entity: &str,
    ref_id: Uuid,
    payload: serde_json::Value,
) -> Result<LogRecord, StoreError> {
    let record = LogRecord {
        id: Uuid::new_v4(),
        entity: entity.to_string(),
        ref_id,
        payload,
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO log_records (id, entity, ref_id, payload, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(record.id.to_string())
    .bind(&record.entity)
    .bind(record.ref_id.to_string())
    .bind(record.payload.to_string())
    .bind(to_rfc3339(record.created_at))
    .execute(pool)
    .await?;

    Ok(record)
}

pub(crate) async fn list_for(
    pool: &SqlitePool,
    entity: &str,
    ref_id: Uuid,
) -> Result<Vec<LogRecord>, StoreError> {
    let rows = sqlx::query_as::<_, LogRecordRow>(
        "SELECT id, entity, ref_id, payload, created_at FROM log_records \
         WHERE entity = ? AND ref_id = ? ORDER BY created_at ASC",
    )
    .bind(entity)
    .bind(ref_id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}
