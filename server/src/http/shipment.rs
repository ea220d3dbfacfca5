//! Lecture et écriture de l'état d'expédition autour de [`workflow::apply`].

use crate::auth::Claims;
use crate::db::models::{Annonce, Devis};
use crate::db::{annonces, devis, DbPool};
use crate::http::validation::parse_id;
use crate::http::errors::CONFLICT_MESSAGE;
use crate::http::ApiError;
use crate::workflow::{ShipmentState, Transition};
use sqlx::SqliteConnection;

pub async fn load_state(
    conn: &mut SqliteConnection,
    annonce: &Annonce,
) -> Result<ShipmentState, ApiError> {
    let accepted = match &annonce.devis_accepte_id {
        Some(id) => devis::statut_of(conn, id).await?,
        None => None,
    };
    Ok(ShipmentState::of(annonce, accepted))
}

/// Persiste la transition; échoue si l'annonce a été modifiée entre-temps.
pub async fn persist(
    conn: &mut SqliteConnection,
    read: &Annonce,
    transition: &Transition,
    devis_accepte_id: Option<&str>,
) -> Result<(), ApiError> {
    let written = annonces::apply_shipment_state(
        conn,
        read,
        transition.state.annonce,
        devis_accepte_id,
        transition.state.tracking,
    )
    .await?;

    if written {
        Ok(())
    } else {
        Err(conflict())
    }
}

pub fn conflict() -> ApiError {
    ApiError::BadRequest(CONFLICT_MESSAGE.to_string())
}

pub async fn find_annonce(pool: &DbPool, raw_id: &str) -> Result<Annonce, ApiError> {
    let id = parse_id(raw_id)?;
    annonces::get_annonce_by_id(pool, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Annonce"))
}

pub async fn find_annonce_in(conn: &mut SqliteConnection, id: &str) -> Result<Annonce, ApiError> {
    annonces::get_annonce_for_update(conn, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Annonce"))
}

pub fn ensure_owner(annonce: &Annonce, claims: &Claims) -> Result<(), ApiError> {
    if annonce.client_id == claims.sub {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Vous n'êtes pas le propriétaire de cette annonce".to_string(),
        ))
    }
}

/// Devis retenu pour l'annonce, s'il existe.
pub async fn accepted_devis(pool: &DbPool, annonce: &Annonce) -> Result<Option<Devis>, ApiError> {
    match &annonce.devis_accepte_id {
        Some(id) => Ok(devis::get_devis_by_id(pool, id).await?),
        None => Ok(None),
    }
}

/// Propriétaire ou transporteur retenu; l'administrateur a aussi accès si `allow_admin`.
pub async fn ensure_party(
    pool: &DbPool,
    annonce: &Annonce,
    claims: &Claims,
    allow_admin: bool,
) -> Result<Option<Devis>, ApiError> {
    let accepted = accepted_devis(pool, annonce).await?;
    let is_transporteur = accepted
        .as_ref()
        .is_some_and(|d| d.transporteur_id == claims.sub);

    if annonce.client_id == claims.sub || is_transporteur || (allow_admin && claims.is_admin()) {
        Ok(accepted)
    } else {
        Err(ApiError::Forbidden("Accès refusé à cette annonce".to_string()))
    }
}
