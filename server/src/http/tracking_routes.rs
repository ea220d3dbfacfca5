use crate::auth::Claims;
use crate::db::models::{DevisStatut, EtapeLivraison, NotificationKind};
use crate::db::tracking::{self, NewTrackingEvent};
use crate::db::{annonces, devis, logs, users};
use crate::http::shipment::{self, ensure_owner, find_annonce};
use crate::http::validation::{parse_id, Checks};
use crate::http::{ApiError, AppState};
use crate::services::{notify, Notice};
use crate::workflow::{self, ShipmentEvent};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingUpdateRequest {
    pub etape: EtapeLivraison,
    pub localisation: Option<String>,
    pub commentaire: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IssueRequest {
    pub description: String,
}

/// Nouvelle étape déclarée par le transporteur retenu. L'historique, le devis et
/// l'annonce sont mis à jour dans la même transaction.
pub async fn update_tracking_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(annonce_id): Path<String>,
    Json(req): Json<TrackingUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let localisation = req.localisation.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let commentaire = req.commentaire.as_deref().map(str::trim).filter(|s| !s.is_empty());
    Checks::new()
        .require(
            localisation.map_or(true, |l| l.chars().count() <= 255),
            "La localisation ne doit pas dépasser 255 caractères",
        )
        .require(
            commentaire.map_or(true, |c| c.chars().count() <= 1000),
            "Le commentaire ne doit pas dépasser 1000 caractères",
        )
        .finish()?;

    let annonce_id = parse_id(&annonce_id)?;

    let mut tx = state.db_pool.begin().await?;
    let annonce = shipment::find_annonce_in(&mut *tx, &annonce_id).await?;
    let accepted_id = annonce
        .devis_accepte_id
        .clone()
        .ok_or(workflow::TransitionError::NoAcceptedQuote)?;
    let accepted = devis::get_devis_for_update(&mut *tx, &accepted_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Devis"))?;
    if accepted.transporteur_id != claims.sub {
        return Err(ApiError::Forbidden(
            "Seul le transporteur retenu peut mettre à jour le suivi".to_string(),
        ));
    }

    let current = shipment::load_state(&mut *tx, &annonce).await?;
    let transition = workflow::apply(&current, ShipmentEvent::TrackingUpdate(req.etape))?;
    let tracking_statut = transition
        .state
        .tracking
        .unwrap_or_else(|| workflow::tracking_for(req.etape));

    let event = tracking::append_event(
        &mut *tx,
        NewTrackingEvent {
            annonce_id: &annonce.id,
            etape: req.etape,
            statut: tracking_statut,
            localisation,
            commentaire,
            auteur_id: &claims.sub,
        },
    )
    .await?;
    let next_devis = transition.quote.unwrap_or(DevisStatut::InProgress);
    if !devis::transition_statut(&mut *tx, &accepted.id, accepted.statut, next_devis).await? {
        return Err(shipment::conflict());
    }
    shipment::persist(&mut *tx, &annonce, &transition, Some(&accepted.id)).await?;
    tx.commit().await?;

    tracing::info!(
        "🚚 Suivi {} -> {:?} ({:?})",
        annonce.id,
        req.etape,
        transition.state.annonce
    );

    notify(
        &state.db_pool,
        Notice::new(
            &annonce.client_id,
            NotificationKind::Tracking,
            "Suivi de livraison",
            format!("« {} »: {}", annonce.titre, req.etape.label()),
        )
        .annonce(&annonce.id)
        .devis(&accepted.id),
    )
    .await;
    match users::get_user_by_id(&state.db_pool, &annonce.client_id).await {
        Ok(Some(client)) => {
            state
                .email
                .send_tracking_update(&client.email, &annonce.titre, req.etape.label())
                .await
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("⚠️ Client introuvable pour l'email de suivi: {}", e),
    }
    logs::record(
        &state.db_pool,
        &claims.sub,
        "tracking_updated",
        "annonce",
        &annonce.id,
        Some(serde_json::json!({ "etape": req.etape })),
    )
    .await;

    let annonce = find_annonce(&state.db_pool, &annonce.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "data": { "event": event, "annonce": annonce },
        })),
    ))
}

pub async fn get_tracking_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(annonce_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let annonce = find_annonce(&state.db_pool, &annonce_id).await?;
    let accepted = shipment::ensure_party(&state.db_pool, &annonce, &claims, true).await?;
    let history = tracking::list_events(&state.db_pool, &annonce.id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": {
            "annonceId": annonce.id,
            "statut": annonce.statut,
            "trackingStatut": annonce.tracking_statut,
            "transporteurId": accepted.map(|d| d.transporteur_id),
            "receptionConfirmeeLe": annonce.reception_confirmee_le,
            "incidentSignaleLe": annonce.incident_signale_le,
            "historique": history,
        },
    })))
}

pub async fn confirm_reception_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(annonce_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let annonce = find_annonce(&state.db_pool, &annonce_id).await?;
    ensure_owner(&annonce, &claims)?;
    if annonce.reception_confirmee_le.is_some() {
        return Err(ApiError::BadRequest("La réception a déjà été confirmée".to_string()));
    }

    let current = workflow::ShipmentState::of(&annonce, None);
    workflow::apply(&current, ShipmentEvent::ReceiptConfirmed)?;

    let updated = annonces::confirm_reception(&state.db_pool, &annonce.id).await?;
    logs::record(&state.db_pool, &claims.sub, "reception_confirmed", "annonce", &annonce.id, None)
        .await;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Réception confirmée",
        "data": updated,
    })))
}

pub async fn report_issue_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(annonce_id): Path<String>,
    Json(req): Json<IssueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Checks::new()
        .length(&req.description, 10, 2000, "description")
        .finish()?;

    let annonce = find_annonce(&state.db_pool, &annonce_id).await?;
    ensure_owner(&annonce, &claims)?;

    let current = workflow::ShipmentState::of(&annonce, None);
    workflow::apply(&current, ShipmentEvent::IssueReported)?;

    let updated = annonces::report_incident(&state.db_pool, &annonce.id, req.description.trim()).await?;
    tracing::warn!("⚠️ Incident signalé sur l'annonce {}", annonce.id);

    if let Some(accepted) = shipment::accepted_devis(&state.db_pool, &annonce).await? {
        notify(
            &state.db_pool,
            Notice::new(
                &accepted.transporteur_id,
                NotificationKind::Incident,
                "Incident signalé",
                format!("Le client a signalé un incident sur « {} ».", annonce.titre),
            )
            .annonce(&annonce.id)
            .devis(&accepted.id),
        )
        .await;
    }
    logs::record(&state.db_pool, &claims.sub, "incident_reported", "annonce", &annonce.id, None)
        .await;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Incident signalé",
        "data": updated,
    })))
}
