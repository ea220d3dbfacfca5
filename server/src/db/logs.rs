use crate::db::models::ActivityLog;
use crate::db::{new_id, DbPool};
use chrono::Utc;
use sqlx::Row;

pub async fn log_activity(
    pool: &DbPool,
    user_id: &str,
    action: &str,
    entity_type: Option<&str>,
    entity_id: Option<&str>,
    metadata: Option<serde_json::Value>,
) -> Result<ActivityLog, sqlx::Error> {
    sqlx::query_as::<_, ActivityLog>(
        r#"
        INSERT INTO activity_logs (id, user_id, action, entity_type, entity_id, metadata, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(new_id())
    .bind(user_id)
    .bind(action)
    .bind(entity_type)
    .bind(entity_id)
    .bind(metadata.map(|m| m.to_string()))
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

/// Journalise sans interrompre la requête en cas d'échec.
pub async fn record(
    pool: &DbPool,
    user_id: &str,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    metadata: Option<serde_json::Value>,
) {
    if let Err(e) =
        log_activity(pool, user_id, action, Some(entity_type), Some(entity_id), metadata).await
    {
        tracing::warn!("⚠️ Journal d'activité non enregistré ({}): {}", action, e);
    }
}

pub async fn list_activity_logs(
    pool: &DbPool,
    user_id: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ActivityLog>, sqlx::Error> {
    sqlx::query_as::<_, ActivityLog>(
        r#"
        SELECT * FROM activity_logs
        WHERE ($1 IS NULL OR user_id = $1)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count_activity_logs(pool: &DbPool, user_id: Option<&str>) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM activity_logs WHERE ($1 IS NULL OR user_id = $1)")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(row.get("count"))
}
