use crate::auth::Claims;
use crate::db::disputes::{self, NewDispute};
use crate::db::models::{Dispute, DisputeStatut, NotificationKind};
use crate::db::{logs, DbPool};
use crate::http::shipment::{self, find_annonce};
use crate::http::validation::{parse_id, Checks};
use crate::http::{ApiError, AppState, PageParams, Paginated};
use crate::services::{notify, Notice};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenDisputeRequest {
    #[serde(alias = "annonce_id")]
    pub annonce_id: String,
    pub motif: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct DisputeMessageRequest {
    pub contenu: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub decision: String,
}

#[derive(Debug, Deserialize)]
pub struct DisputeQuery {
    pub statut: Option<DisputeStatut>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

async fn find_dispute(pool: &DbPool, raw_id: &str) -> Result<Dispute, ApiError> {
    let id = parse_id(raw_id)?;
    disputes::get_dispute_by_id(pool, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Litige"))
}

fn ensure_involved(dispute: &Dispute, claims: &Claims) -> Result<(), ApiError> {
    if dispute.involves(&claims.sub) || claims.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Accès refusé à ce litige".to_string()))
    }
}

fn closed() -> ApiError {
    ApiError::BadRequest("Ce litige est clôturé".to_string())
}

async fn notify_parties(state: &AppState, dispute: &Dispute, titre: &str, message: &str) {
    for user_id in [&dispute.ouvert_par, &dispute.contre] {
        notify(
            &state.db_pool,
            Notice::new(user_id, NotificationKind::Litige, titre, message.to_string())
                .annonce(&dispute.annonce_id),
        )
        .await;
    }
}

pub async fn open_dispute_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<OpenDisputeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Checks::new()
        .length(&req.motif, 3, 100, "motif")
        .length(&req.description, 10, 2000, "description")
        .finish()?;

    let annonce = find_annonce(&state.db_pool, &req.annonce_id).await?;
    let accepted = shipment::accepted_devis(&state.db_pool, &annonce)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Aucun transporteur retenu pour cette annonce".to_string()))?;
    let contre = if claims.sub == annonce.client_id {
        accepted.transporteur_id.as_str()
    } else if claims.sub == accepted.transporteur_id {
        annonce.client_id.as_str()
    } else {
        return Err(ApiError::Forbidden(
            "Seules les parties de la livraison peuvent ouvrir un litige".to_string(),
        ));
    };

    if disputes::has_active_for_annonce(&state.db_pool, &annonce.id).await? {
        return Err(ApiError::BadRequest(
            "Un litige est déjà en cours pour cette annonce".to_string(),
        ));
    }

    let dispute = disputes::create_dispute(
        &state.db_pool,
        NewDispute {
            annonce_id: &annonce.id,
            devis_id: Some(&accepted.id),
            ouvert_par: &claims.sub,
            contre,
            motif: req.motif.trim(),
            description: req.description.trim(),
        },
    )
    .await?;

    tracing::warn!("⚖️ Litige {} ouvert sur l'annonce {}", dispute.id, annonce.id);

    notify(
        &state.db_pool,
        Notice::new(
            contre,
            NotificationKind::Litige,
            "Litige ouvert",
            format!("Un litige a été ouvert concernant « {} ».", annonce.titre),
        )
        .annonce(&annonce.id)
        .devis(&accepted.id),
    )
    .await;
    logs::record(&state.db_pool, &claims.sub, "dispute_opened", "dispute", &dispute.id, None).await;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "data": dispute })),
    ))
}

pub async fn my_disputes_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let items = disputes::list_for_user(&state.db_pool, &claims.sub).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": items })))
}

pub async fn get_dispute_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let dispute = find_dispute(&state.db_pool, &id).await?;
    ensure_involved(&dispute, &claims)?;
    let messages = disputes::list_messages(&state.db_pool, &dispute.id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": { "litige": dispute, "messages": messages },
    })))
}

pub async fn add_dispute_message_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<DisputeMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Checks::new()
        .length(&req.contenu, 1, 2000, "contenu")
        .finish()?;

    let dispute = find_dispute(&state.db_pool, &id).await?;
    ensure_involved(&dispute, &claims)?;
    if dispute.statut.is_terminal() {
        return Err(closed());
    }

    let message = disputes::add_message(&state.db_pool, &dispute.id, &claims.sub, req.contenu.trim()).await?;

    for user_id in [&dispute.ouvert_par, &dispute.contre] {
        if *user_id != claims.sub {
            notify(
                &state.db_pool,
                Notice::new(
                    user_id,
                    NotificationKind::Litige,
                    "Nouveau message sur un litige",
                    format!("Nouveau message sur le litige « {} ».", dispute.motif),
                )
                .annonce(&dispute.annonce_id),
            )
            .await;
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "data": message })),
    ))
}

pub async fn cancel_dispute_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let dispute = find_dispute(&state.db_pool, &id).await?;
    if dispute.ouvert_par != claims.sub {
        return Err(ApiError::Forbidden(
            "Seul l'auteur du litige peut l'annuler".to_string(),
        ));
    }

    let cancelled = disputes::set_statut(&state.db_pool, &dispute.id, DisputeStatut::Cancelled, None, None)
        .await?
        .ok_or_else(closed)?;

    notify(
        &state.db_pool,
        Notice::new(
            &dispute.contre,
            NotificationKind::Litige,
            "Litige annulé",
            format!("Le litige « {} » a été annulé.", dispute.motif),
        )
        .annonce(&dispute.annonce_id),
    )
    .await;
    logs::record(&state.db_pool, &claims.sub, "dispute_cancelled", "dispute", &dispute.id, None).await;

    Ok(Json(serde_json::json!({ "success": true, "data": cancelled })))
}

pub async fn admin_list_disputes_handler(
    State(state): State<AppState>,
    Query(query): Query<DisputeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let params = PageParams {
        page: query.page,
        limit: query.limit,
    };
    let items = disputes::list_all(&state.db_pool, query.statut, params.limit(), params.offset()).await?;
    let total = disputes::count_all(&state.db_pool, query.statut).await?;

    Ok(Json(Paginated::new(items, total, &params)))
}

pub async fn admin_review_dispute_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let dispute = find_dispute(&state.db_pool, &id).await?;
    if dispute.statut != DisputeStatut::Open {
        return Err(ApiError::BadRequest(
            "Seul un litige ouvert peut être pris en charge".to_string(),
        ));
    }

    let reviewed = disputes::set_statut(
        &state.db_pool,
        &dispute.id,
        DisputeStatut::InReview,
        None,
        Some(&claims.sub),
    )
    .await?
    .ok_or_else(closed)?;

    notify_parties(
        &state,
        &reviewed,
        "Litige en cours d'examen",
        &format!("Le litige « {} » est examiné par un administrateur.", reviewed.motif),
    )
    .await;
    logs::record(&state.db_pool, &claims.sub, "dispute_reviewed", "dispute", &reviewed.id, None).await;

    Ok(Json(serde_json::json!({ "success": true, "data": reviewed })))
}

pub async fn admin_resolve_dispute_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<ResolveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Checks::new()
        .length(&req.decision, 5, 2000, "decision")
        .finish()?;

    let dispute = find_dispute(&state.db_pool, &id).await?;
    let resolved = disputes::set_statut(
        &state.db_pool,
        &dispute.id,
        DisputeStatut::Resolved,
        Some(req.decision.trim()),
        Some(&claims.sub),
    )
    .await?
    .ok_or_else(closed)?;

    tracing::info!("⚖️ Litige {} résolu par {}", resolved.id, claims.sub);

    notify_parties(
        &state,
        &resolved,
        "Litige résolu",
        &format!("Le litige « {} » a été résolu: {}", resolved.motif, req.decision.trim()),
    )
    .await;
    logs::record(
        &state.db_pool,
        &claims.sub,
        "dispute_resolved",
        "dispute",
        &resolved.id,
        Some(serde_json::json!({ "decision": req.decision.trim() })),
    )
    .await;

    Ok(Json(serde_json::json!({ "success": true, "data": resolved })))
}
