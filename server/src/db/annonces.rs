use crate::db::models::{Annonce, AnnoncePhoto, AnnonceStatut, PaymentStatut, TrackingStatut};
use crate::db::{new_id, DbPool};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

#[derive(Debug, Clone)]
pub struct AnnonceInput {
    pub titre: String,
    pub description: String,
    pub type_marchandise: String,
    pub ville_depart: String,
    pub adresse_depart: Option<String>,
    pub ville_arrivee: String,
    pub adresse_arrivee: Option<String>,
    pub date_depart: NaiveDate,
    pub date_arrivee_souhaitee: Option<NaiveDate>,
    pub poids_kg: f64,
    pub volume_m3: Option<f64>,
    pub budget_max: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct AnnonceFilter {
    pub client_id: Option<String>,
    pub statut: Option<AnnonceStatut>,
    pub ville_depart: Option<String>,
    pub ville_arrivee: Option<String>,
    pub type_marchandise: Option<String>,
    pub date_min: Option<NaiveDate>,
    pub date_max: Option<NaiveDate>,
    pub poids_max: Option<f64>,
    pub search: Option<String>,
}

impl AnnonceFilter {
    fn push_where<'a>(&'a self, qb: &mut QueryBuilder<'a, Sqlite>) {
        qb.push(" WHERE 1 = 1");
        if let Some(client_id) = &self.client_id {
            qb.push(" AND client_id = ").push_bind(client_id);
        }
        if let Some(statut) = self.statut {
            qb.push(" AND statut = ").push_bind(statut);
        }
        if let Some(ville) = &self.ville_depart {
            qb.push(" AND lower(ville_depart) LIKE ")
                .push_bind(format!("%{}%", ville.to_lowercase()));
        }
        if let Some(ville) = &self.ville_arrivee {
            qb.push(" AND lower(ville_arrivee) LIKE ")
                .push_bind(format!("%{}%", ville.to_lowercase()));
        }
        if let Some(kind) = &self.type_marchandise {
            qb.push(" AND type_marchandise = ").push_bind(kind);
        }
        if let Some(date) = self.date_min {
            qb.push(" AND date_depart >= ").push_bind(date);
        }
        if let Some(date) = self.date_max {
            qb.push(" AND date_depart <= ").push_bind(date);
        }
        if let Some(poids) = self.poids_max {
            qb.push(" AND poids_kg <= ").push_bind(poids);
        }
        if let Some(q) = &self.search {
            let pattern = format!("%{}%", q.to_lowercase());
            qb.push(" AND (lower(titre) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR lower(description) LIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }
}

pub async fn create_annonce(
    pool: &DbPool,
    client_id: &str,
    input: &AnnonceInput,
) -> Result<Annonce, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as::<_, Annonce>(
        r#"
        INSERT INTO annonces
        (id, client_id, titre, description, type_marchandise, ville_depart, adresse_depart,
         ville_arrivee, adresse_arrivee, date_depart, date_arrivee_souhaitee, poids_kg,
         volume_m3, budget_max, statut, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, 'available', $15, $15)
        RETURNING *
        "#,
    )
    .bind(new_id())
    .bind(client_id)
    .bind(&input.titre)
    .bind(&input.description)
    .bind(&input.type_marchandise)
    .bind(&input.ville_depart)
    .bind(&input.adresse_depart)
    .bind(&input.ville_arrivee)
    .bind(&input.adresse_arrivee)
    .bind(input.date_depart)
    .bind(input.date_arrivee_souhaitee)
    .bind(input.poids_kg)
    .bind(input.volume_m3)
    .bind(input.budget_max)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub async fn get_annonce_by_id(pool: &DbPool, id: &str) -> Result<Option<Annonce>, sqlx::Error> {
    sqlx::query_as::<_, Annonce>("SELECT * FROM annonces WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn get_annonce_for_update(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Annonce>, sqlx::Error> {
    sqlx::query_as::<_, Annonce>("SELECT * FROM annonces WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn list_annonces(
    pool: &DbPool,
    filter: &AnnonceFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<Annonce>, sqlx::Error> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM annonces");
    filter.push_where(&mut qb);
    qb.push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    qb.build_query_as::<Annonce>().fetch_all(pool).await
}

pub async fn count_annonces(pool: &DbPool, filter: &AnnonceFilter) -> Result<i64, sqlx::Error> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) as count FROM annonces");
    filter.push_where(&mut qb);
    let row = qb.build().fetch_one(pool).await?;
    Ok(row.get("count"))
}

pub async fn update_annonce(
    pool: &DbPool,
    id: &str,
    input: &AnnonceInput,
) -> Result<Annonce, sqlx::Error> {
    // Garde: seule une annonce encore ouverte est modifiable
    sqlx::query_as::<_, Annonce>(
        r#"
        UPDATE annonces
        SET titre = $1, description = $2, type_marchandise = $3, ville_depart = $4,
            adresse_depart = $5, ville_arrivee = $6, adresse_arrivee = $7, date_depart = $8,
            date_arrivee_souhaitee = $9, poids_kg = $10, volume_m3 = $11, budget_max = $12,
            updated_at = $13
        WHERE id = $14 AND statut = 'available' AND devis_accepte_id IS NULL
        RETURNING *
        "#,
    )
    .bind(&input.titre)
    .bind(&input.description)
    .bind(&input.type_marchandise)
    .bind(&input.ville_depart)
    .bind(&input.adresse_depart)
    .bind(&input.ville_arrivee)
    .bind(&input.adresse_arrivee)
    .bind(input.date_depart)
    .bind(input.date_arrivee_souhaitee)
    .bind(input.poids_kg)
    .bind(input.volume_m3)
    .bind(input.budget_max)
    .bind(Utc::now())
    .bind(id)
    .fetch_one(pool)
    .await
}

pub async fn delete_annonce(pool: &DbPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM annonces WHERE id = $1 AND statut = 'available' AND devis_accepte_id IS NULL",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Écrit le nouvel état d'expédition si l'annonce n'a pas changé depuis sa lecture (`read`).
pub async fn apply_shipment_state(
    conn: &mut SqliteConnection,
    read: &Annonce,
    statut: AnnonceStatut,
    devis_accepte_id: Option<&str>,
    tracking_statut: Option<TrackingStatut>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE annonces
        SET statut = $1, devis_accepte_id = $2, tracking_statut = $3, updated_at = $4
        WHERE id = $5 AND statut = $6 AND devis_accepte_id IS $7
        "#,
    )
    .bind(statut)
    .bind(devis_accepte_id)
    .bind(tracking_statut)
    .bind(Utc::now())
    .bind(&read.id)
    .bind(read.statut)
    .bind(&read.devis_accepte_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn set_payment_summary(
    conn: &mut SqliteConnection,
    id: &str,
    statut: PaymentStatut,
    montant: f64,
    date: Option<DateTime<Utc>>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE annonces
        SET paiement_statut = $1, paiement_montant = $2, paiement_date = $3, updated_at = $4
        WHERE id = $5
        "#,
    )
    .bind(statut)
    .bind(montant)
    .bind(date)
    .bind(Utc::now())
    .bind(id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn confirm_reception(pool: &DbPool, id: &str) -> Result<Annonce, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as::<_, Annonce>(
        r#"
        UPDATE annonces SET reception_confirmee_le = $1, updated_at = $1
        WHERE id = $2 AND statut = 'done'
        RETURNING *
        "#,
    )
    .bind(now)
    .bind(id)
    .fetch_one(pool)
    .await
}

pub async fn report_incident(
    pool: &DbPool,
    id: &str,
    description: &str,
) -> Result<Annonce, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as::<_, Annonce>(
        r#"
        UPDATE annonces SET incident_description = $1, incident_signale_le = $2, updated_at = $2
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(description)
    .bind(now)
    .bind(id)
    .fetch_one(pool)
    .await
}

pub async fn count_by_statut(
    pool: &DbPool,
    client_id: Option<&str>,
) -> Result<Vec<(AnnonceStatut, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (AnnonceStatut, i64)>(
        r#"
        SELECT statut, COUNT(*) FROM annonces
        WHERE ($1 IS NULL OR client_id = $1)
        GROUP BY statut
        "#,
    )
    .bind(client_id)
    .fetch_all(pool)
    .await
}

pub async fn add_photo(
    pool: &DbPool,
    annonce_id: &str,
    chemin: &str,
) -> Result<AnnoncePhoto, sqlx::Error> {
    sqlx::query_as::<_, AnnoncePhoto>(
        r#"
        INSERT INTO annonce_photos (id, annonce_id, chemin, created_at)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(new_id())
    .bind(annonce_id)
    .bind(chemin)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

pub async fn list_photos(pool: &DbPool, annonce_id: &str) -> Result<Vec<AnnoncePhoto>, sqlx::Error> {
    sqlx::query_as::<_, AnnoncePhoto>(
        "SELECT * FROM annonce_photos WHERE annonce_id = $1 ORDER BY created_at ASC",
    )
    .bind(annonce_id)
    .fetch_all(pool)
    .await
}

pub async fn count_photos(pool: &DbPool, annonce_id: &str) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM annonce_photos WHERE annonce_id = $1")
        .bind(annonce_id)
        .fetch_one(pool)
        .await?;
    Ok(row.get("count"))
}

pub async fn delete_photo(
    pool: &DbPool,
    annonce_id: &str,
    photo_id: &str,
) -> Result<Option<AnnoncePhoto>, sqlx::Error> {
    sqlx::query_as::<_, AnnoncePhoto>(
        "DELETE FROM annonce_photos WHERE id = $1 AND annonce_id = $2 RETURNING *",
    )
    .bind(photo_id)
    .bind(annonce_id)
    .fetch_optional(pool)
    .await
}

pub async fn monthly_counts(pool: &DbPool) -> Result<Vec<(String, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT substr(created_at, 1, 7) as mois, COUNT(*) FROM annonces
        GROUP BY mois ORDER BY mois DESC LIMIT 12
        "#,
    )
    .fetch_all(pool)
    .await
}
