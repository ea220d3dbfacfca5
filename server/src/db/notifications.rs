use crate::db::models::{Notification, NotificationKind};
use crate::db::{new_id, DbPool};
use chrono::Utc;
use sqlx::Row;

pub struct NewNotification<'a> {
    pub user_id: &'a str,
    pub kind: NotificationKind,
    pub titre: &'a str,
    pub message: &'a str,
    pub annonce_id: Option<&'a str>,
    pub devis_id: Option<&'a str>,
}

pub async fn create_notification(
    pool: &DbPool,
    new: NewNotification<'_>,
) -> Result<Notification, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        r#"
        INSERT INTO notifications (id, user_id, kind, titre, message, annonce_id, devis_id, lu, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8)
        RETURNING *
        "#,
    )
    .bind(new_id())
    .bind(new.user_id)
    .bind(new.kind)
    .bind(new.titre)
    .bind(new.message)
    .bind(new.annonce_id)
    .bind(new.devis_id)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

pub async fn list_for_user(
    pool: &DbPool,
    user_id: &str,
    unread_only: bool,
    limit: i64,
    offset: i64,
) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        r#"
        SELECT * FROM notifications
        WHERE user_id = $1 AND ($2 = 0 OR lu = 0)
        ORDER BY created_at DESC, rowid DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(user_id)
    .bind(unread_only)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count_for_user(pool: &DbPool, user_id: &str, unread_only: bool) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) as count FROM notifications WHERE user_id = $1 AND ($2 = 0 OR lu = 0)",
    )
    .bind(user_id)
    .bind(unread_only)
    .fetch_one(pool)
    .await?;
    Ok(row.get("count"))
}

pub async fn mark_read(pool: &DbPool, user_id: &str, id: &str) -> Result<Option<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        "UPDATE notifications SET lu = 1 WHERE id = $1 AND user_id = $2 RETURNING *",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn mark_all_read(pool: &DbPool, user_id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE notifications SET lu = 1 WHERE user_id = $1 AND lu = 0")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_notification(pool: &DbPool, user_id: &str, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
