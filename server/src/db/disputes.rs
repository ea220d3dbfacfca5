use crate::db::models::{Dispute, DisputeMessage, DisputeStatut};
use crate::db::{new_id, DbPool};
use chrono::Utc;
use sqlx::Row;

pub struct NewDispute<'a> {
    pub annonce_id: &'a str,
    pub devis_id: Option<&'a str>,
    pub ouvert_par: &'a str,
    pub contre: &'a str,
    pub motif: &'a str,
    pub description: &'a str,
}

pub async fn create_dispute(pool: &DbPool, new: NewDispute<'_>) -> Result<Dispute, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as::<_, Dispute>(
        r#"
        INSERT INTO disputes
        (id, annonce_id, devis_id, ouvert_par, contre, motif, description, statut, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'open', $8, $8)
        RETURNING *
        "#,
    )
    .bind(new_id())
    .bind(new.annonce_id)
    .bind(new.devis_id)
    .bind(new.ouvert_par)
    .bind(new.contre)
    .bind(new.motif)
    .bind(new.description)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub async fn get_dispute_by_id(pool: &DbPool, id: &str) -> Result<Option<Dispute>, sqlx::Error> {
    sqlx::query_as::<_, Dispute>("SELECT * FROM disputes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn has_active_for_annonce(pool: &DbPool, annonce_id: &str) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) as count FROM disputes WHERE annonce_id = $1 AND statut IN ('open', 'in_review')",
    )
    .bind(annonce_id)
    .fetch_one(pool)
    .await?;
    let count: i64 = row.get("count");
    Ok(count > 0)
}

pub async fn list_for_user(pool: &DbPool, user_id: &str) -> Result<Vec<Dispute>, sqlx::Error> {
    sqlx::query_as::<_, Dispute>(
        "SELECT * FROM disputes WHERE ouvert_par = $1 OR contre = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn list_all(
    pool: &DbPool,
    statut: Option<DisputeStatut>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Dispute>, sqlx::Error> {
    sqlx::query_as::<_, Dispute>(
        r#"
        SELECT * FROM disputes WHERE ($1 IS NULL OR statut = $1)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(statut)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count_all(pool: &DbPool, statut: Option<DisputeStatut>) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM disputes WHERE ($1 IS NULL OR statut = $1)")
        .bind(statut)
        .fetch_one(pool)
        .await?;
    Ok(row.get("count"))
}

pub async fn count_unresolved(pool: &DbPool) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) as count FROM disputes WHERE statut IN ('open', 'in_review')",
    )
    .fetch_one(pool)
    .await?;
    Ok(row.get("count"))
}

/// Change le statut d'un litige non clos; `None` si le litige est déjà clos ou absent.
pub async fn set_statut(
    pool: &DbPool,
    id: &str,
    statut: DisputeStatut,
    decision: Option<&str>,
    decide_par: Option<&str>,
) -> Result<Option<Dispute>, sqlx::Error> {
    let now = Utc::now();
    let resolved_at = statut.is_terminal().then_some(now);
    sqlx::query_as::<_, Dispute>(
        r#"
        UPDATE disputes
        SET statut = $1, decision = COALESCE($2, decision), decide_par = COALESCE($3, decide_par),
            resolved_at = $4, updated_at = $5
        WHERE id = $6 AND statut IN ('open', 'in_review')
        RETURNING *
        "#,
    )
    .bind(statut)
    .bind(decision)
    .bind(decide_par)
    .bind(resolved_at)
    .bind(now)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn add_message(
    pool: &DbPool,
    dispute_id: &str,
    auteur_id: &str,
    contenu: &str,
) -> Result<DisputeMessage, sqlx::Error> {
    sqlx::query_as::<_, DisputeMessage>(
        r#"
        INSERT INTO dispute_messages (id, dispute_id, auteur_id, contenu, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(new_id())
    .bind(dispute_id)
    .bind(auteur_id)
    .bind(contenu)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

pub async fn list_messages(pool: &DbPool, dispute_id: &str) -> Result<Vec<DisputeMessage>, sqlx::Error> {
    sqlx::query_as::<_, DisputeMessage>(
        "SELECT * FROM dispute_messages WHERE dispute_id = $1 ORDER BY created_at ASC, rowid ASC",
    )
    .bind(dispute_id)
    .fetch_all(pool)
    .await
}
