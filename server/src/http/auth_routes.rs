use crate::auth::{create_token, hash_password, hash_token, verify_password, Claims};
use crate::db::models::{Role, User};
use crate::db::{logs, password_resets, users};
use crate::http::validation::Checks;
use crate::http::{ApiError, AppState, UserResponse};
use crate::utils::mask::{mask_email, mask_sensitive};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

const RESET_TOKEN_TTL_HOURS: i64 = 1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub nom: String,
    pub prenom: String,
    pub telephone: Option<String>,
    pub entreprise: Option<String>,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

fn issue_token(state: &AppState, user: &User) -> Result<String, ApiError> {
    Ok(create_token(
        &user.id,
        &user.email,
        user.role,
        &state.jwt_secret,
        state.config.jwt_expiry_hours,
    )?)
}

pub async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = || ApiError::Unauthorized("Email ou mot de passe incorrect".to_string());

    let user = users::get_user_by_email(&state.db_pool, &req.email)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&req.password, &user.password_hash)? {
        tracing::debug!("Échec de connexion pour {}", mask_email(&user.email));
        return Err(invalid());
    }

    if !user.is_active {
        return Err(ApiError::Forbidden("Ce compte a été désactivé".to_string()));
    }

    if let Err(e) = users::update_last_login(&state.db_pool, &user.id).await {
        tracing::warn!("⚠️ last_login non mis à jour: {}", e);
    }

    let token = issue_token(&state, &user)?;
    tracing::info!("🔑 Connexion: {}", mask_email(&user.email));

    Ok((
        StatusCode::OK,
        Json(LoginResponse {
            success: true,
            token,
            user: UserResponse::from(user),
        }),
    ))
}

pub async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Checks::new()
        .email(&req.email)
        .require(
            req.password.chars().count() >= 8,
            "Le mot de passe doit contenir au moins 8 caractères",
        )
        .not_blank(&req.nom, "nom")
        .not_blank(&req.prenom, "prénom")
        .require(
            req.role != Role::Admin,
            "Le rôle doit être client ou transporteur",
        )
        .finish()?;

    if users::get_user_by_email(&state.db_pool, &req.email)
        .await?
        .is_some()
    {
        return Err(ApiError::BadRequest("Cet email est déjà utilisé".to_string()));
    }

    let password_hash = hash_password(&req.password, state.config.bcrypt_cost)?;
    let user = users::create_user(
        &state.db_pool,
        users::NewUser {
            email: &req.email,
            password_hash: &password_hash,
            nom: req.nom.trim(),
            prenom: req.prenom.trim(),
            telephone: req.telephone.as_deref(),
            entreprise: req.entreprise.as_deref(),
            role: req.role,
        },
    )
    .await?;

    let token = issue_token(&state, &user)?;
    tracing::info!("👤 Nouveau compte {}: {}", user.role, mask_email(&user.email));

    logs::record(&state.db_pool, &user.id, "register", "user", &user.id, None).await;
    state.email.send_welcome(&user.email, &user.prenom).await;

    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            success: true,
            token,
            user: UserResponse::from(user),
        }),
    ))
}

pub async fn me_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user = users::get_user_by_id(&state.db_pool, &claims.sub)
        .await?
        .ok_or_else(|| ApiError::not_found("Utilisateur"))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "user": UserResponse::from(user),
    })))
}

/// Répond toujours 200 pour ne pas révéler l'existence d'un compte.
pub async fn forgot_password_handler(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Checks::new().email(&req.email).finish()?;

    if let Some(user) = users::get_user_by_email(&state.db_pool, &req.email).await? {
        let token = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        let expires_at = Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS);
        password_resets::store_token(&state.db_pool, &hash_token(&token), &user.id, expires_at)
            .await?;

        tracing::info!(
            "🔁 Réinitialisation demandée pour {} (jeton {})",
            mask_email(&user.email),
            mask_sensitive(&token)
        );
        state.email.send_password_reset(&user.email, &token).await;
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Si un compte existe pour cet email, un lien de réinitialisation a été envoyé",
    })))
}

pub async fn reset_password_handler(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Checks::new()
        .not_blank(&req.token, "token")
        .require(
            req.password.chars().count() >= 8,
            "Le mot de passe doit contenir au moins 8 caractères",
        )
        .finish()?;

    let user_id = password_resets::consume_token(&state.db_pool, &hash_token(req.token.trim()))
        .await?
        .ok_or_else(|| {
            ApiError::BadRequest("Lien de réinitialisation invalide ou expiré".to_string())
        })?;

    let password_hash = hash_password(&req.password, state.config.bcrypt_cost)?;
    users::set_password_hash(&state.db_pool, &user_id, &password_hash).await?;
    logs::record(&state.db_pool, &user_id, "password_reset", "user", &user_id, None).await;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Mot de passe réinitialisé",
    })))
}
