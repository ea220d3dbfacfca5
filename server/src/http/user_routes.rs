use crate::auth::{hash_password, verify_password, Claims};
use crate::db::{logs, users};
use crate::http::uploads::next_file;
use crate::http::validation::{parse_id, Checks};
use crate::http::{ApiError, AppState, PublicProfile, UserResponse};
use crate::services::UploadKind;
use axum::{
    extract::{Multipart, Path, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub nom: Option<String>,
    pub prenom: Option<String>,
    pub telephone: Option<String>,
    pub entreprise: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub async fn get_profile_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_id(&user_id)?;
    let user = users::get_user_by_id(&state.db_pool, &user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::not_found("Utilisateur"))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": PublicProfile::from(user),
    })))
}

pub async fn update_profile_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut checks = Checks::new();
    if let Some(nom) = &req.nom {
        checks.length(nom, 1, 100, "nom");
    }
    if let Some(prenom) = &req.prenom {
        checks.length(prenom, 1, 100, "prénom");
    }
    checks.finish()?;

    let updated = users::update_user_profile(
        &state.db_pool,
        &claims.sub,
        users::ProfileUpdate {
            nom: req.nom.map(|s| s.trim().to_string()),
            prenom: req.prenom.map(|s| s.trim().to_string()),
            telephone: req.telephone,
            entreprise: req.entreprise,
        },
    )
    .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "user": UserResponse::from(updated),
    })))
}

pub async fn change_password_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Checks::new()
        .require(
            req.new_password.chars().count() >= 8,
            "Le mot de passe doit contenir au moins 8 caractères",
        )
        .finish()?;

    let user = users::get_user_by_id(&state.db_pool, &claims.sub)
        .await?
        .ok_or_else(|| ApiError::not_found("Utilisateur"))?;

    if !verify_password(&req.current_password, &user.password_hash)? {
        return Err(ApiError::BadRequest("Mot de passe actuel incorrect".to_string()));
    }

    let password_hash = hash_password(&req.new_password, state.config.bcrypt_cost)?;
    users::set_password_hash(&state.db_pool, &user.id, &password_hash).await?;
    logs::record(&state.db_pool, &user.id, "password_changed", "user", &user.id, None).await;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Mot de passe modifié",
    })))
}

pub async fn upload_avatar_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let file = next_file(&mut multipart, "avatar")
        .await?
        .ok_or_else(|| ApiError::BadRequest("Aucun fichier « avatar » reçu".to_string()))?;

    let previous = users::get_user_by_id(&state.db_pool, &claims.sub)
        .await?
        .ok_or_else(|| ApiError::not_found("Utilisateur"))?
        .avatar;

    let path = state
        .storage
        .store_image(UploadKind::Avatar, file.content_type.as_deref(), &file.data)
        .await?;

    let user = match users::set_avatar(&state.db_pool, &claims.sub, &path).await {
        Ok(user) => user,
        Err(e) => {
            state.storage.remove_quietly(&path).await;
            return Err(e.into());
        }
    };

    if let Some(old) = previous {
        state.storage.remove_quietly(&old).await;
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "user": UserResponse::from(user),
    })))
}
