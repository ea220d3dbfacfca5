use crate::db::models::Message;
use crate::db::{new_id, DbPool};
use chrono::Utc;
use sqlx::Row;
use std::collections::HashMap;

pub async fn create_message(
    pool: &DbPool,
    expediteur_id: &str,
    destinataire_id: &str,
    annonce_id: Option<&str>,
    contenu: &str,
) -> Result<Message, sqlx::Error> {
    sqlx::query_as::<_, Message>(
        r#"
        INSERT INTO messages (id, expediteur_id, destinataire_id, annonce_id, contenu, lu, created_at)
        VALUES ($1, $2, $3, $4, $5, 0, $6)
        RETURNING *
        "#,
    )
    .bind(new_id())
    .bind(expediteur_id)
    .bind(destinataire_id)
    .bind(annonce_id)
    .bind(contenu)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

pub async fn get_message_by_id(pool: &DbPool, id: &str) -> Result<Option<Message>, sqlx::Error> {
    sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Dernier message échangé avec chaque interlocuteur, du plus récent au plus ancien.
pub async fn latest_per_counterpart(
    pool: &DbPool,
    user_id: &str,
) -> Result<Vec<Message>, sqlx::Error> {
    sqlx::query_as::<_, Message>(
        r#"
        SELECT id, expediteur_id, destinataire_id, annonce_id, contenu, lu, created_at
        FROM (
            SELECT m.*, ROW_NUMBER() OVER (
                PARTITION BY CASE WHEN m.expediteur_id = $1 THEN m.destinataire_id ELSE m.expediteur_id END
                ORDER BY m.created_at DESC, m.rowid DESC
            ) as rang
            FROM messages m
            WHERE m.expediteur_id = $1 OR m.destinataire_id = $1
        )
        WHERE rang = 1
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Messages non lus reçus, par expéditeur.
pub async fn unread_by_sender(
    pool: &DbPool,
    user_id: &str,
) -> Result<HashMap<String, i64>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT expediteur_id, COUNT(*) FROM messages
        WHERE destinataire_id = $1 AND lu = 0
        GROUP BY expediteur_id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().collect())
}

pub async fn conversation(
    pool: &DbPool,
    user_id: &str,
    other_id: &str,
) -> Result<Vec<Message>, sqlx::Error> {
    sqlx::query_as::<_, Message>(
        r#"
        SELECT * FROM messages
        WHERE (expediteur_id = $1 AND destinataire_id = $2)
           OR (expediteur_id = $2 AND destinataire_id = $1)
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(user_id)
    .bind(other_id)
    .fetch_all(pool)
    .await
}

pub async fn mark_conversation_read(
    pool: &DbPool,
    user_id: &str,
    other_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE messages SET lu = 1 WHERE destinataire_id = $1 AND expediteur_id = $2 AND lu = 0",
    )
    .bind(user_id)
    .bind(other_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn unread_count(pool: &DbPool, user_id: &str) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM messages WHERE destinataire_id = $1 AND lu = 0")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(row.get("count"))
}

pub async fn delete_message(pool: &DbPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM messages WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
