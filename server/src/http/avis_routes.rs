use crate::auth::Claims;
use crate::db::avis::{self, NewAvis};
use crate::db::models::{AnnonceStatut, NotificationKind};
use crate::db::{logs, users};
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
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAvisRequest {
    #[serde(alias = "annonce_id")]
    pub annonce_id: String,
    #[serde(alias = "destinataire_id")]
    pub destinataire_id: String,
    pub note: i64,
    pub commentaire: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RatingSummary {
    note_moyenne: f64,
    nombre_avis: i64,
}

/// Le client évalue le transporteur retenu, et inversement, une fois la livraison terminée.
pub async fn create_avis_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateAvisRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Checks::new()
        .require((1..=5).contains(&req.note), "La note doit être comprise entre 1 et 5")
        .length(&req.commentaire, 10, 1000, "commentaire")
        .finish()?;

    let annonce = find_annonce(&state.db_pool, &req.annonce_id).await?;
    let destinataire_id = parse_id(&req.destinataire_id)?;
    if annonce.statut != AnnonceStatut::Done {
        return Err(ApiError::BadRequest(
            "Un avis ne peut être laissé qu'après la livraison".to_string(),
        ));
    }

    let accepted = shipment::accepted_devis(&state.db_pool, &annonce)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Aucun transporteur retenu pour cette annonce".to_string()))?;
    let counterpart = if claims.sub == annonce.client_id {
        &accepted.transporteur_id
    } else if claims.sub == accepted.transporteur_id {
        &annonce.client_id
    } else {
        return Err(ApiError::Forbidden(
            "Vous n'avez pas participé à cette livraison".to_string(),
        ));
    };
    if *counterpart != destinataire_id {
        return Err(ApiError::Forbidden(
            "Vous ne pouvez évaluer que votre interlocuteur sur cette livraison".to_string(),
        ));
    }

    if avis::exists_for(&state.db_pool, &claims.sub, &annonce.id).await? {
        return Err(ApiError::BadRequest(
            "Vous avez déjà laissé un avis pour cette annonce".to_string(),
        ));
    }

    let created = avis::create_avis(
        &state.db_pool,
        NewAvis {
            auteur_id: &claims.sub,
            destinataire_id: &destinataire_id,
            annonce_id: &annonce.id,
            note: req.note,
            commentaire: req.commentaire.trim(),
        },
    )
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => ApiError::BadRequest(
            "Vous avez déjà laissé un avis pour cette annonce".to_string(),
        ),
        other => other.into(),
    })?;

    let (moyenne, nombre) = users::recompute_rating(&state.db_pool, &destinataire_id).await?;
    tracing::info!(
        "⭐ Avis {} pour {}: moyenne {:.2} sur {} avis",
        created.id,
        destinataire_id,
        moyenne,
        nombre
    );

    notify(
        &state.db_pool,
        Notice::new(
            &destinataire_id,
            NotificationKind::Avis,
            "Nouvel avis",
            format!("Vous avez reçu un avis {}/5 pour « {} ».", created.note, annonce.titre),
        )
        .annonce(&annonce.id),
    )
    .await;
    logs::record(&state.db_pool, &claims.sub, "avis_created", "avis", &created.id, None).await;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "data": created })),
    ))
}

pub async fn user_avis_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_id(&user_id)?;
    let user = users::get_user_by_id(&state.db_pool, &user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Utilisateur"))?;

    let items = avis::list_received(&state.db_pool, &user.id, params.limit(), params.offset()).await?;
    let total = avis::count_received(&state.db_pool, &user.id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "resume": RatingSummary {
            note_moyenne: user.note_moyenne,
            nombre_avis: user.nombre_avis,
        },
        "avis": Paginated::new(items, total, &params),
    })))
}

pub async fn my_avis_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let written = avis::list_written(&state.db_pool, &claims.sub).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": written })))
}
