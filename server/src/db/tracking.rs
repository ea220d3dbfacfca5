use crate::db::models::{EtapeLivraison, TrackingEvent, TrackingStatut};
use crate::db::{new_id, DbPool};
use chrono::Utc;
use sqlx::SqliteConnection;

pub struct NewTrackingEvent<'a> {
    pub annonce_id: &'a str,
    pub etape: EtapeLivraison,
    pub statut: TrackingStatut,
    pub localisation: Option<&'a str>,
    pub commentaire: Option<&'a str>,
    pub auteur_id: &'a str,
}

/// L'historique est en ajout seul: un même événement rejoué crée une nouvelle ligne.
pub async fn append_event(
    conn: &mut SqliteConnection,
    event: NewTrackingEvent<'_>,
) -> Result<TrackingEvent, sqlx::Error> {
    sqlx::query_as::<_, TrackingEvent>(
        r#"
        INSERT INTO tracking_events
        (id, annonce_id, etape, statut, localisation, commentaire, auteur_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(new_id())
    .bind(event.annonce_id)
    .bind(event.etape)
    .bind(event.statut)
    .bind(event.localisation)
    .bind(event.commentaire)
    .bind(event.auteur_id)
    .bind(Utc::now())
    .fetch_one(conn)
    .await
}

pub async fn list_events(pool: &DbPool, annonce_id: &str) -> Result<Vec<TrackingEvent>, sqlx::Error> {
    // rowid départage deux événements enregistrés dans la même microseconde
    sqlx::query_as::<_, TrackingEvent>(
        "SELECT * FROM tracking_events WHERE annonce_id = $1 ORDER BY created_at ASC, rowid ASC",
    )
    .bind(annonce_id)
    .fetch_all(pool)
    .await
}

pub async fn last_event(pool: &DbPool, annonce_id: &str) -> Result<Option<TrackingEvent>, sqlx::Error> {
    sqlx::query_as::<_, TrackingEvent>(
        r#"
        SELECT * FROM tracking_events WHERE annonce_id = $1
        ORDER BY created_at DESC, rowid DESC LIMIT 1
        "#,
    )
    .bind(annonce_id)
    .fetch_optional(pool)
    .await
}
