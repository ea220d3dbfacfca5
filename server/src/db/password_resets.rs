use crate::db::DbPool;
use chrono::{DateTime, Utc};

pub async fn store_token(
    pool: &DbPool,
    token_hash: &str,
    user_id: &str,
    expires_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    // Un seul jeton actif par compte
    sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    sqlx::query(
        "INSERT INTO password_reset_tokens (token_hash, user_id, expires_at) VALUES ($1, $2, $3)",
    )
    .bind(token_hash)
    .bind(user_id)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Consomme un jeton valide et renvoie l'utilisateur associé.
pub async fn consume_token(pool: &DbPool, token_hash: &str) -> Result<Option<String>, sqlx::Error> {
    let now = Utc::now();
    let row = sqlx::query_as::<_, (String, DateTime<Utc>)>(
        "SELECT user_id, expires_at FROM password_reset_tokens WHERE token_hash = $1 AND used_at IS NULL",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;

    let Some((user_id, expires_at)) = row else {
        return Ok(None);
    };
    if expires_at <= now {
        return Ok(None);
    }

    let result = sqlx::query(
        "UPDATE password_reset_tokens SET used_at = $1 WHERE token_hash = $2 AND used_at IS NULL",
    )
    .bind(now)
    .bind(token_hash)
    .execute(pool)
    .await?;

    Ok((result.rows_affected() == 1).then_some(user_id))
}
