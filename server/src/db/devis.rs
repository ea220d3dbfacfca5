use crate::db::models::{Devis, DevisStatut};
use crate::db::{new_id, DbPool};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Row, SqliteConnection};

pub struct NewDevis<'a> {
    pub annonce_id: &'a str,
    pub transporteur_id: &'a str,
    pub montant: f64,
    pub delai_livraison: NaiveDate,
    pub date_validite: DateTime<Utc>,
    pub message: Option<&'a str>,
}

pub async fn create_devis(pool: &DbPool, new: NewDevis<'_>) -> Result<Devis, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as::<_, Devis>(
        r#"
        INSERT INTO devis
        (id, annonce_id, transporteur_id, montant, delai_livraison, date_validite, message,
         statut, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $8)
        RETURNING *
        "#,
    )
    .bind(new_id())
    .bind(new.annonce_id)
    .bind(new.transporteur_id)
    .bind(new.montant)
    .bind(new.delai_livraison)
    .bind(new.date_validite)
    .bind(new.message)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub async fn get_devis_by_id(pool: &DbPool, id: &str) -> Result<Option<Devis>, sqlx::Error> {
    sqlx::query_as::<_, Devis>("SELECT * FROM devis WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn get_devis_for_update(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Devis>, sqlx::Error> {
    sqlx::query_as::<_, Devis>("SELECT * FROM devis WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn statut_of(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<DevisStatut>, sqlx::Error> {
    sqlx::query_scalar::<_, DevisStatut>("SELECT statut FROM devis WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn list_by_annonce(pool: &DbPool, annonce_id: &str) -> Result<Vec<Devis>, sqlx::Error> {
    sqlx::query_as::<_, Devis>(
        "SELECT * FROM devis WHERE annonce_id = $1 ORDER BY montant ASC, created_at ASC",
    )
    .bind(annonce_id)
    .fetch_all(pool)
    .await
}

pub async fn count_by_annonce(pool: &DbPool, annonce_id: &str) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM devis WHERE annonce_id = $1")
        .bind(annonce_id)
        .fetch_one(pool)
        .await?;
    Ok(row.get("count"))
}

pub async fn list_by_transporteur(
    pool: &DbPool,
    transporteur_id: &str,
    statut: Option<DevisStatut>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Devis>, sqlx::Error> {
    sqlx::query_as::<_, Devis>(
        r#"
        SELECT * FROM devis
        WHERE transporteur_id = $1 AND ($2 IS NULL OR statut = $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(transporteur_id)
    .bind(statut)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count_by_transporteur(
    pool: &DbPool,
    transporteur_id: &str,
    statut: Option<DevisStatut>,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) as count FROM devis WHERE transporteur_id = $1 AND ($2 IS NULL OR statut = $2)",
    )
    .bind(transporteur_id)
    .bind(statut)
    .fetch_one(pool)
    .await?;
    Ok(row.get("count"))
}

pub struct DevisUpdate {
    pub montant: f64,
    pub delai_livraison: NaiveDate,
    pub date_validite: DateTime<Utc>,
    pub message: Option<String>,
}

pub async fn update_pending_devis(
    pool: &DbPool,
    id: &str,
    update: &DevisUpdate,
) -> Result<Option<Devis>, sqlx::Error> {
    sqlx::query_as::<_, Devis>(
        r#"
        UPDATE devis
        SET montant = $1, delai_livraison = $2, date_validite = $3, message = $4, updated_at = $5
        WHERE id = $6 AND statut = 'pending'
        RETURNING *
        "#,
    )
    .bind(update.montant)
    .bind(update.delai_livraison)
    .bind(update.date_validite)
    .bind(&update.message)
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Change le statut d'un devis seulement s'il est encore au statut `expected`.
pub async fn transition_statut(
    conn: &mut SqliteConnection,
    id: &str,
    expected: DevisStatut,
    statut: DevisStatut,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE devis SET statut = $1, updated_at = $2 WHERE id = $3 AND statut = $4",
    )
    .bind(statut)
    .bind(Utc::now())
    .bind(id)
    .bind(expected)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Refuse tous les devis en attente de l'annonce, sauf `except_id`; renvoie les devis refusés.
pub async fn refuse_pending(
    conn: &mut SqliteConnection,
    annonce_id: &str,
    except_id: Option<&str>,
) -> Result<Vec<Devis>, sqlx::Error> {
    sqlx::query_as::<_, Devis>(
        r#"
        UPDATE devis SET statut = 'refused', updated_at = $1
        WHERE annonce_id = $2 AND statut = 'pending' AND ($3 IS NULL OR id != $3)
        RETURNING *
        "#,
    )
    .bind(Utc::now())
    .bind(annonce_id)
    .bind(except_id)
    .fetch_all(conn)
    .await
}

pub async fn count_by_statut_for_transporteur(
    pool: &DbPool,
    transporteur_id: &str,
) -> Result<Vec<(DevisStatut, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (DevisStatut, i64)>(
        "SELECT statut, COUNT(*) FROM devis WHERE transporteur_id = $1 GROUP BY statut",
    )
    .bind(transporteur_id)
    .fetch_all(pool)
    .await
}

/// Nombre de devis reçus et montant moyen, sur toutes les annonces d'un client.
pub async fn received_summary(pool: &DbPool, client_id: &str) -> Result<(i64, f64), sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(d.id) as total, COALESCE(AVG(d.montant), 0.0) as moyenne
        FROM devis d JOIN annonces a ON a.id = d.annonce_id
        WHERE a.client_id = $1
        "#,
    )
    .bind(client_id)
    .fetch_one(pool)
    .await?;
    Ok((row.get("total"), row.get("moyenne")))
}

pub async fn count_devis(pool: &DbPool) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM devis")
        .fetch_one(pool)
        .await?;
    Ok(row.get("count"))
}
