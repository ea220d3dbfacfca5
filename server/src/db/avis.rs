use crate::db::models::Avis;
use crate::db::{new_id, DbPool};
use chrono::Utc;
use sqlx::Row;

pub struct NewAvis<'a> {
    pub auteur_id: &'a str,
    pub destinataire_id: &'a str,
    pub annonce_id: &'a str,
    pub note: i64,
    pub commentaire: &'a str,
}

pub async fn create_avis(pool: &DbPool, new: NewAvis<'_>) -> Result<Avis, sqlx::Error> {
    sqlx::query_as::<_, Avis>(
        r#"
        INSERT INTO avis (id, auteur_id, destinataire_id, annonce_id, note, commentaire, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(new_id())
    .bind(new.auteur_id)
    .bind(new.destinataire_id)
    .bind(new.annonce_id)
    .bind(new.note)
    .bind(new.commentaire.trim())
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

pub async fn exists_for(pool: &DbPool, auteur_id: &str, annonce_id: &str) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM avis WHERE auteur_id = $1 AND annonce_id = $2")
        .bind(auteur_id)
        .bind(annonce_id)
        .fetch_one(pool)
        .await?;
    let count: i64 = row.get("count");
    Ok(count > 0)
}

pub async fn list_received(
    pool: &DbPool,
    destinataire_id: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<Avis>, sqlx::Error> {
    sqlx::query_as::<_, Avis>(
        r#"
        SELECT * FROM avis WHERE destinataire_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(destinataire_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count_received(pool: &DbPool, destinataire_id: &str) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM avis WHERE destinataire_id = $1")
        .bind(destinataire_id)
        .fetch_one(pool)
        .await?;
    Ok(row.get("count"))
}

pub async fn list_written(pool: &DbPool, auteur_id: &str) -> Result<Vec<Avis>, sqlx::Error> {
    sqlx::query_as::<_, Avis>("SELECT * FROM avis WHERE auteur_id = $1 ORDER BY created_at DESC")
        .bind(auteur_id)
        .fetch_all(pool)
        .await
}
