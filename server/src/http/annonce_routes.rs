use crate::auth::{require_role, Claims};
use crate::db::annonces::{self, AnnonceFilter, AnnonceInput};
use crate::db::models::{Annonce, AnnoncePhoto, AnnonceStatut, DevisStatut, NotificationKind, Role};
use crate::db::{devis, logs, payments};
use crate::http::shipment::{self, ensure_owner, find_annonce};
use crate::http::uploads::collect_files;
use crate::http::validation::{parse_id, Checks};
use crate::http::{ApiError, AppState, PageParams, Paginated};
use crate::services::{notify, Notice, UploadKind};
use crate::workflow::{self, ShipmentEvent};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_PHOTOS: usize = 5;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnonceRequest {
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

impl AnnonceRequest {
    fn validate(self) -> Result<AnnonceInput, ApiError> {
        let mut checks = Checks::new();
        checks
            .length(&self.titre, 5, 100, "titre")
            .length(&self.description, 10, 2000, "description")
            .not_blank(&self.type_marchandise, "type de marchandise")
            .not_blank(&self.ville_depart, "ville de départ")
            .not_blank(&self.ville_arrivee, "ville d'arrivée")
            .positive(self.poids_kg, "poids")
            .require(
                self.date_depart >= Utc::now().date_naive(),
                "La date de départ ne peut pas être dans le passé",
            );
        if let Some(volume) = self.volume_m3 {
            checks.positive(volume, "volume");
        }
        if let Some(budget) = self.budget_max {
            checks.positive(budget, "budget");
        }
        if let Some(arrivee) = self.date_arrivee_souhaitee {
            checks.require(
                arrivee >= self.date_depart,
                "La date d'arrivée souhaitée doit suivre la date de départ",
            );
        }
        checks.finish()?;

        Ok(AnnonceInput {
            titre: self.titre.trim().to_string(),
            description: self.description.trim().to_string(),
            type_marchandise: self.type_marchandise.trim().to_string(),
            ville_depart: self.ville_depart.trim().to_string(),
            adresse_depart: self.adresse_depart,
            ville_arrivee: self.ville_arrivee.trim().to_string(),
            adresse_arrivee: self.adresse_arrivee,
            date_depart: self.date_depart,
            date_arrivee_souhaitee: self.date_arrivee_souhaitee,
            poids_kg: self.poids_kg,
            volume_m3: self.volume_m3,
            budget_max: self.budget_max,
        })
    }
}

/// Filtres de recherche (`?ville_depart=Lyon&poids_max=500&page=2`).
#[derive(Debug, Default, Deserialize)]
pub struct AnnonceQuery {
    pub ville_depart: Option<String>,
    pub ville_arrivee: Option<String>,
    pub type_marchandise: Option<String>,
    pub statut: Option<AnnonceStatut>,
    pub date_min: Option<NaiveDate>,
    pub date_max: Option<NaiveDate>,
    pub poids_max: Option<f64>,
    pub q: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl AnnonceQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams {
            page: self.page,
            limit: self.limit,
        }
    }

    pub fn into_filter(self, default_statut: Option<AnnonceStatut>) -> AnnonceFilter {
        let non_empty = |s: Option<String>| s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        AnnonceFilter {
            client_id: None,
            statut: self.statut.or(default_statut),
            ville_depart: non_empty(self.ville_depart),
            ville_arrivee: non_empty(self.ville_arrivee),
            type_marchandise: non_empty(self.type_marchandise),
            date_min: self.date_min,
            date_max: self.date_max,
            poids_max: self.poids_max,
            search: non_empty(self.q),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MineQuery {
    pub statut: Option<AnnonceStatut>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnonceDetail {
    #[serde(flatten)]
    pub annonce: Annonce,
    pub photos: Vec<AnnoncePhoto>,
    pub nombre_devis: i64,
}

pub async fn list_paginated(
    state: &AppState,
    filter: &AnnonceFilter,
    params: &PageParams,
) -> Result<Paginated<Annonce>, ApiError> {
    let items = annonces::list_annonces(&state.db_pool, filter, params.limit(), params.offset()).await?;
    let total = annonces::count_annonces(&state.db_pool, filter).await?;
    Ok(Paginated::new(items, total, params))
}

pub async fn create_annonce_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AnnonceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&claims, Role::Client)?;
    let input = req.validate()?;

    let annonce = annonces::create_annonce(&state.db_pool, &claims.sub, &input).await?;
    tracing::info!(
        "📦 Annonce créée {} ({} -> {})",
        annonce.id,
        annonce.ville_depart,
        annonce.ville_arrivee
    );
    logs::record(&state.db_pool, &claims.sub, "annonce_created", "annonce", &annonce.id, None).await;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "data": annonce })),
    ))
}

pub async fn list_annonces_handler(
    State(state): State<AppState>,
    Query(query): Query<AnnonceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let params = query.page_params();
    let filter = query.into_filter(Some(AnnonceStatut::Available));
    Ok(Json(list_paginated(&state, &filter, &params).await?))
}

pub async fn my_annonces_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MineQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&claims, Role::Client)?;
    let params = PageParams {
        page: query.page,
        limit: query.limit,
    };
    let filter = AnnonceFilter {
        client_id: Some(claims.sub.clone()),
        statut: query.statut,
        ..Default::default()
    };
    Ok(Json(list_paginated(&state, &filter, &params).await?))
}

pub async fn get_annonce_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let annonce = find_annonce(&state.db_pool, &id).await?;
    let photos = annonces::list_photos(&state.db_pool, &annonce.id).await?;
    let nombre_devis = devis::count_by_annonce(&state.db_pool, &annonce.id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": AnnonceDetail { annonce, photos, nombre_devis },
    })))
}

fn ensure_editable(annonce: &Annonce) -> Result<(), ApiError> {
    if annonce.is_editable() {
        Ok(())
    } else {
        Err(ApiError::BadRequest(
            "Cette annonce ne peut plus être modifiée (devis accepté ou annonce fermée)".to_string(),
        ))
    }
}

pub async fn update_annonce_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<AnnonceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let annonce = find_annonce(&state.db_pool, &id).await?;
    ensure_owner(&annonce, &claims)?;
    ensure_editable(&annonce)?;
    let input = req.validate()?;

    let updated = annonces::update_annonce(&state.db_pool, &annonce.id, &input)
        .await
        .map_err(|e| match e {
            // La garde SQL a refusé: l'annonce a changé depuis la lecture
            sqlx::Error::RowNotFound => shipment::conflict(),
            other => other.into(),
        })?;

    Ok(Json(serde_json::json!({ "success": true, "data": updated })))
}

pub async fn delete_annonce_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let annonce = find_annonce(&state.db_pool, &id).await?;
    ensure_owner(&annonce, &claims)?;
    ensure_editable(&annonce)?;

    let photos = annonces::list_photos(&state.db_pool, &annonce.id).await?;
    if !annonces::delete_annonce(&state.db_pool, &annonce.id).await? {
        return Err(shipment::conflict());
    }
    for photo in photos {
        state.storage.remove_quietly(&photo.chemin).await;
    }

    tracing::info!("🗑️ Annonce supprimée {}", annonce.id);
    logs::record(&state.db_pool, &claims.sub, "annonce_deleted", "annonce", &annonce.id, None).await;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Annonce supprimée",
    })))
}

pub async fn cancel_annonce_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;

    let mut tx = state.db_pool.begin().await?;
    let annonce = shipment::find_annonce_in(&mut *tx, &id).await?;
    ensure_owner(&annonce, &claims)?;

    let current = shipment::load_state(&mut *tx, &annonce).await?;
    let transition = workflow::apply(&current, ShipmentEvent::AnnonceCancelled)?;

    let mut cancelled_devis = None;
    if let (Some(devis_id), Some(from)) = (&annonce.devis_accepte_id, current.accepted_devis) {
        if !devis::transition_statut(&mut *tx, devis_id, from, DevisStatut::Cancelled).await? {
            return Err(shipment::conflict());
        }
        payments::fail_pending_for_devis(&mut *tx, devis_id).await?;
        cancelled_devis = devis::get_devis_for_update(&mut *tx, devis_id).await?;
    }
    let refused = devis::refuse_pending(&mut *tx, &annonce.id, None).await?;
    shipment::persist(&mut *tx, &annonce, &transition, annonce.devis_accepte_id.as_deref()).await?;
    tx.commit().await?;

    tracing::info!("🚫 Annonce annulée {} ({} devis refusés)", annonce.id, refused.len());

    for d in &refused {
        notify(
            &state.db_pool,
            Notice::new(
                &d.transporteur_id,
                NotificationKind::AnnonceAnnulee,
                "Annonce annulée",
                format!("L'annonce « {} » a été annulée par le client.", annonce.titre),
            )
            .annonce(&annonce.id)
            .devis(&d.id),
        )
        .await;
    }
    if let Some(d) = &cancelled_devis {
        notify(
            &state.db_pool,
            Notice::new(
                &d.transporteur_id,
                NotificationKind::AnnonceAnnulee,
                "Mission annulée",
                format!("Le client a annulé l'annonce « {} » qui vous était confiée.", annonce.titre),
            )
            .annonce(&annonce.id)
            .devis(&d.id),
        )
        .await;
    }
    logs::record(&state.db_pool, &claims.sub, "annonce_cancelled", "annonce", &annonce.id, None).await;

    let updated = find_annonce(&state.db_pool, &annonce.id).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": updated })))
}

pub async fn upload_photos_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let annonce = find_annonce(&state.db_pool, &id).await?;
    ensure_owner(&annonce, &claims)?;
    if annonce.statut != AnnonceStatut::Available {
        return Err(ApiError::BadRequest(
            "Les photos ne peuvent être ajoutées qu'à une annonce ouverte".to_string(),
        ));
    }

    let existing = annonces::count_photos(&state.db_pool, &annonce.id).await? as usize;
    let remaining = MAX_PHOTOS.saturating_sub(existing);
    if remaining == 0 {
        return Err(ApiError::BadRequest(format!(
            "{} photos maximum par annonce",
            MAX_PHOTOS
        )));
    }

    let files = collect_files(&mut multipart, "photos", remaining).await?;
    if files.is_empty() {
        return Err(ApiError::BadRequest("Aucun fichier « photos » reçu".to_string()));
    }

    let mut stored = Vec::with_capacity(files.len());
    for file in &files {
        match state
            .storage
            .store_image(UploadKind::AnnoncePhoto, file.content_type.as_deref(), &file.data)
            .await
        {
            Ok(path) => stored.push(path),
            Err(e) => {
                for path in &stored {
                    state.storage.remove_quietly(path).await;
                }
                return Err(e.into());
            }
        }
    }

    let mut photos = Vec::with_capacity(stored.len());
    for (i, path) in stored.iter().enumerate() {
        match annonces::add_photo(&state.db_pool, &annonce.id, path).await {
            Ok(photo) => photos.push(photo),
            Err(e) => {
                // Les fichiers sans ligne en base sont retirés
                for path in &stored[i..] {
                    state.storage.remove_quietly(path).await;
                }
                return Err(e.into());
            }
        }
    }

    tracing::info!("🖼️ {} photo(s) ajoutée(s) à l'annonce {}", photos.len(), annonce.id);

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "data": photos })),
    ))
}

pub async fn delete_photo_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, photo_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let annonce = find_annonce(&state.db_pool, &id).await?;
    ensure_owner(&annonce, &claims)?;
    let photo_id = parse_id(&photo_id)?;

    let photo = annonces::delete_photo(&state.db_pool, &annonce.id, &photo_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Photo"))?;
    state.storage.remove_quietly(&photo.chemin).await;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Photo supprimée",
    })))
}
