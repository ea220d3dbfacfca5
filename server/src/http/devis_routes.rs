use crate::auth::{require_role, Claims};
use crate::db::devis::{self, DevisUpdate, NewDevis};
use crate::db::models::{Devis, DevisStatut, NotificationKind, Role};
use crate::db::{logs, payments, users, DbPool};
use crate::http::shipment::{self, ensure_owner, find_annonce};
use crate::http::validation::{parse_id, Checks};
use crate::http::{ApiError, AppState, PageParams, Paginated};
use crate::services::{notify, Notice};
use crate::workflow::{self, ShipmentEvent, ShipmentState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;

const DEFAULT_VALIDITY_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDevisRequest {
    pub annonce_id: String,
    pub montant: f64,
    pub delai_livraison: NaiveDate,
    pub date_validite: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDevisRequest {
    pub montant: f64,
    pub delai_livraison: NaiveDate,
    pub date_validite: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DevisQuery {
    pub statut: Option<DevisStatut>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn validate_terms(
    montant: f64,
    delai_livraison: NaiveDate,
    date_validite: Option<DateTime<Utc>>,
    message: Option<&str>,
) -> Result<DateTime<Utc>, ApiError> {
    let now = Utc::now();
    let date_validite = date_validite.unwrap_or(now + Duration::days(DEFAULT_VALIDITY_DAYS));

    Checks::new()
        .positive(montant, "montant")
        .require(
            delai_livraison >= now.date_naive(),
            "Le délai de livraison ne peut pas être dans le passé",
        )
        .require(
            date_validite > now,
            "La date de validité doit être dans le futur",
        )
        .require(
            message.map_or(true, |m| m.chars().count() <= 1000),
            "Le message ne doit pas dépasser 1000 caractères",
        )
        .finish()?;

    Ok(date_validite)
}

async fn find_devis(pool: &DbPool, raw_id: &str) -> Result<Devis, ApiError> {
    let id = parse_id(raw_id)?;
    devis::get_devis_by_id(pool, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Devis"))
}

fn ensure_author(devis: &Devis, claims: &Claims) -> Result<(), ApiError> {
    if devis.transporteur_id == claims.sub {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Vous n'êtes pas l'auteur de ce devis".to_string(),
        ))
    }
}

pub async fn create_devis_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateDevisRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&claims, Role::Transporteur)?;
    let date_validite = validate_terms(
        req.montant,
        req.delai_livraison,
        req.date_validite,
        req.message.as_deref(),
    )?;

    let annonce = find_annonce(&state.db_pool, &req.annonce_id).await?;
    if annonce.client_id == claims.sub {
        return Err(ApiError::BadRequest(
            "Vous ne pouvez pas proposer un devis sur votre propre annonce".to_string(),
        ));
    }
    let retained = annonce.devis_accepte_id.as_ref().map(|_| DevisStatut::Accepted);
    workflow::apply(&ShipmentState::of(&annonce, retained), ShipmentEvent::QuoteSubmitted)?;

    let created = devis::create_devis(
        &state.db_pool,
        NewDevis {
            annonce_id: &annonce.id,
            transporteur_id: &claims.sub,
            montant: req.montant,
            delai_livraison: req.delai_livraison,
            date_validite,
            message: req.message.as_deref().map(str::trim),
        },
    )
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => ApiError::BadRequest(
            "Vous avez déjà proposé un devis pour cette annonce".to_string(),
        ),
        other => other.into(),
    })?;

    tracing::info!("💶 Devis {} sur l'annonce {} ({:.2})", created.id, annonce.id, created.montant);

    notify(
        &state.db_pool,
        Notice::new(
            &annonce.client_id,
            NotificationKind::NouveauDevis,
            "Nouveau devis",
            format!(
                "Vous avez reçu un devis de {:.2} € pour « {} ».",
                created.montant, annonce.titre
            ),
        )
        .annonce(&annonce.id)
        .devis(&created.id),
    )
    .await;
    logs::record(&state.db_pool, &claims.sub, "devis_created", "devis", &created.id, None).await;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "data": created })),
    ))
}

pub async fn my_devis_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<DevisQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&claims, Role::Transporteur)?;
    let params = PageParams {
        page: query.page,
        limit: query.limit,
    };

    let items = devis::list_by_transporteur(
        &state.db_pool,
        &claims.sub,
        query.statut,
        params.limit(),
        params.offset(),
    )
    .await?;
    let total = devis::count_by_transporteur(&state.db_pool, &claims.sub, query.statut).await?;

    Ok(Json(Paginated::new(items, total, &params)))
}

pub async fn annonce_devis_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(annonce_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let annonce = find_annonce(&state.db_pool, &annonce_id).await?;
    if !claims.is_admin() {
        ensure_owner(&annonce, &claims)?;
    }

    let items = devis::list_by_annonce(&state.db_pool, &annonce.id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "data": items,
        "total": items.len(),
    })))
}

pub async fn get_devis_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let found = find_devis(&state.db_pool, &id).await?;
    if found.transporteur_id != claims.sub && !claims.is_admin() {
        let annonce = find_annonce(&state.db_pool, &found.annonce_id).await?;
        ensure_owner(&annonce, &claims)?;
    }

    Ok(Json(serde_json::json!({ "success": true, "data": found })))
}

pub async fn update_devis_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<UpdateDevisRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let found = find_devis(&state.db_pool, &id).await?;
    ensure_author(&found, &claims)?;
    if found.statut != DevisStatut::Pending {
        return Err(workflow::TransitionError::InvalidQuoteState(found.statut).into());
    }

    let date_validite = validate_terms(
        req.montant,
        req.delai_livraison,
        req.date_validite,
        req.message.as_deref(),
    )?;
    let update = DevisUpdate {
        montant: req.montant,
        delai_livraison: req.delai_livraison,
        date_validite,
        message: req.message.map(|m| m.trim().to_string()),
    };

    let updated = devis::update_pending_devis(&state.db_pool, &found.id, &update)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Seul un devis en attente peut être modifié".to_string()))?;

    Ok(Json(serde_json::json!({ "success": true, "data": updated })))
}

/// Acceptation: le devis est retenu, les autres devis en attente sont refusés,
/// l'annonce passe en attente d'enlèvement. Tout est écrit dans une transaction.
pub async fn accept_devis_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;

    let mut tx = state.db_pool.begin().await?;
    let target = devis::get_devis_for_update(&mut *tx, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Devis"))?;
    let annonce = shipment::find_annonce_in(&mut *tx, &target.annonce_id).await?;
    ensure_owner(&annonce, &claims)?;

    let current = shipment::load_state(&mut *tx, &annonce).await?;
    let transition = workflow::apply(
        &current,
        ShipmentEvent::QuoteAccepted {
            quote: target.statut,
            expired: target.is_expired(Utc::now()),
        },
    )?;

    if !devis::transition_statut(&mut *tx, &target.id, DevisStatut::Pending, DevisStatut::Accepted)
        .await?
    {
        return Err(shipment::conflict());
    }
    let refused = devis::refuse_pending(&mut *tx, &annonce.id, Some(&target.id)).await?;
    shipment::persist(&mut *tx, &annonce, &transition, Some(&target.id)).await?;
    tx.commit().await?;

    tracing::info!(
        "✅ Devis {} accepté pour l'annonce {} ({} refusé(s))",
        target.id,
        annonce.id,
        refused.len()
    );

    notify(
        &state.db_pool,
        Notice::new(
            &target.transporteur_id,
            NotificationKind::DevisAccepte,
            "Devis accepté",
            format!("Votre devis pour « {} » a été accepté.", annonce.titre),
        )
        .annonce(&annonce.id)
        .devis(&target.id),
    )
    .await;
    for d in &refused {
        notify(
            &state.db_pool,
            Notice::new(
                &d.transporteur_id,
                NotificationKind::DevisRefuse,
                "Devis non retenu",
                format!("Un autre devis a été retenu pour « {} ».", annonce.titre),
            )
            .annonce(&annonce.id)
            .devis(&d.id),
        )
        .await;
    }
    match users::get_user_by_id(&state.db_pool, &target.transporteur_id).await {
        Ok(Some(transporteur)) => {
            state
                .email
                .send_devis_accepted(&transporteur.email, &annonce.titre, target.montant)
                .await
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("⚠️ Transporteur introuvable pour l'email: {}", e),
    }
    logs::record(
        &state.db_pool,
        &claims.sub,
        "devis_accepted",
        "devis",
        &target.id,
        Some(serde_json::json!({ "annonce_id": annonce.id, "refuses": refused.len() })),
    )
    .await;

    let accepted = find_devis(&state.db_pool, &target.id).await?;
    let annonce = find_annonce(&state.db_pool, &annonce.id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Devis accepté",
        "data": {
            "devis": accepted,
            "annonce": annonce,
            "devisRefuses": refused.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
        },
    })))
}

pub async fn refuse_devis_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let target = find_devis(&state.db_pool, &id).await?;
    let annonce = find_annonce(&state.db_pool, &target.annonce_id).await?;
    ensure_owner(&annonce, &claims)?;

    let current = ShipmentState::of(&annonce, None);
    workflow::apply(&current, ShipmentEvent::QuoteRefused { quote: target.statut })?;

    let mut tx = state.db_pool.begin().await?;
    if !devis::transition_statut(&mut *tx, &target.id, DevisStatut::Pending, DevisStatut::Refused)
        .await?
    {
        return Err(shipment::conflict());
    }
    tx.commit().await?;

    notify(
        &state.db_pool,
        Notice::new(
            &target.transporteur_id,
            NotificationKind::DevisRefuse,
            "Devis refusé",
            format!("Votre devis pour « {} » a été refusé.", annonce.titre),
        )
        .annonce(&annonce.id)
        .devis(&target.id),
    )
    .await;

    let refused = find_devis(&state.db_pool, &target.id).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": refused })))
}

pub async fn cancel_devis_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;

    let mut tx = state.db_pool.begin().await?;
    let target = devis::get_devis_for_update(&mut *tx, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Devis"))?;
    ensure_author(&target, &claims)?;
    let annonce = shipment::find_annonce_in(&mut *tx, &target.annonce_id).await?;

    let current = shipment::load_state(&mut *tx, &annonce).await?;
    let transition = workflow::apply(&current, ShipmentEvent::QuoteCancelled { quote: target.statut })?;

    if !devis::transition_statut(&mut *tx, &target.id, target.statut, DevisStatut::Cancelled).await? {
        return Err(shipment::conflict());
    }
    // Le devis retenu est annulé: l'annonce est rouverte
    if target.statut == DevisStatut::Accepted {
        payments::fail_pending_for_devis(&mut *tx, &target.id).await?;
        shipment::persist(&mut *tx, &annonce, &transition, None).await?;
    }
    tx.commit().await?;

    tracing::info!("↩️ Devis {} annulé par son auteur", target.id);

    notify(
        &state.db_pool,
        Notice::new(
            &annonce.client_id,
            NotificationKind::DevisAnnule,
            "Devis annulé",
            format!("Un transporteur a retiré son devis pour « {} ».", annonce.titre),
        )
        .annonce(&annonce.id)
        .devis(&target.id),
    )
    .await;
    logs::record(&state.db_pool, &claims.sub, "devis_cancelled", "devis", &target.id, None).await;

    let cancelled = find_devis(&state.db_pool, &target.id).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": cancelled })))
}
