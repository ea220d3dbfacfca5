use crate::auth::Claims;
use crate::db::models::Role;
use crate::db::{analytics, logs, users};
use crate::http::annonce_routes::{list_paginated, AnnonceQuery};
use crate::http::models::UserResponse;
use crate::http::validation::parse_id;
use crate::http::{ApiError, AppState, PageParams, Paginated};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub role: Option<Role>,
    pub q: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub user_id: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    #[serde(alias = "is_active")]
    pub is_active: bool,
}

fn not_self(claims: &Claims, user_id: &str) -> Result<(), ApiError> {
    if claims.sub == user_id {
        Err(ApiError::BadRequest(
            "Action impossible sur votre propre compte".to_string(),
        ))
    } else {
        Ok(())
    }
}

pub async fn get_users_handler(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let params = PageParams {
        page: query.page,
        limit: query.limit,
    };
    let search = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty());

    let user_list: Vec<UserResponse> = users::list_users(
        &state.db_pool,
        query.role,
        search,
        params.limit(),
        params.offset(),
    )
    .await?
    .into_iter()
    .map(UserResponse::from)
    .collect();
    let total = users::count_users_filtered(&state.db_pool, query.role, search).await?;

    Ok(Json(Paginated::new(user_list, total, &params)))
}

pub async fn get_user_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = parse_id(&user_id)?;
    let user = users::get_user_by_id(&state.db_pool, &uid)
        .await?
        .ok_or_else(|| ApiError::not_found("Utilisateur"))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": UserResponse::from(user),
    })))
}

pub async fn set_user_status_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = parse_id(&user_id)?;
    not_self(&claims, &uid)?;
    users::get_user_by_id(&state.db_pool, &uid)
        .await?
        .ok_or_else(|| ApiError::not_found("Utilisateur"))?;

    let user = users::set_active(&state.db_pool, &uid, req.is_active).await?;
    tracing::info!(
        "👤 Compte {} {} par {}",
        user.id,
        if req.is_active { "réactivé" } else { "désactivé" },
        claims.sub
    );
    logs::record(
        &state.db_pool,
        &claims.sub,
        "user_status_changed",
        "user",
        &user.id,
        Some(serde_json::json!({ "is_active": req.is_active })),
    )
    .await;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": UserResponse::from(user),
    })))
}

pub async fn delete_user_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = parse_id(&user_id)?;
    not_self(&claims, &uid)?;
    let user = users::get_user_by_id(&state.db_pool, &uid)
        .await?
        .ok_or_else(|| ApiError::not_found("Utilisateur"))?;

    // Les paiements sont conservés: un compte qui en porte ne peut qu'être désactivé
    users::delete_user(&state.db_pool, &user.id)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => ApiError::BadRequest(
                "Ce compte a des paiements enregistrés, désactivez-le plutôt".to_string(),
            ),
            other => other.into(),
        })?;
    if let Some(avatar) = user.avatar.as_deref() {
        state.storage.remove_quietly(avatar).await;
    }

    tracing::warn!("🗑️ Compte {} supprimé par {}", user.id, claims.sub);
    logs::record(&state.db_pool, &claims.sub, "user_deleted", "user", &user.id, None).await;

    Ok(Json(serde_json::json!({ "success": true, "message": "Utilisateur supprimé" })))
}

pub async fn get_annonces_handler(
    State(state): State<AppState>,
    Query(query): Query<AnnonceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let params = query.page_params();
    let filter = query.into_filter(None);
    Ok(Json(list_paginated(&state, &filter, &params).await?))
}

pub async fn get_activity_logs_handler(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let params = PageParams {
        page: query.page,
        limit: query.limit,
    };
    let user_id = query.user_id.as_deref().map(parse_id).transpose()?;

    let logs_list = logs::list_activity_logs(
        &state.db_pool,
        user_id.as_deref(),
        params.limit(),
        params.offset(),
    )
    .await?;
    let total = logs::count_activity_logs(&state.db_pool, user_id.as_deref()).await?;

    Ok(Json(Paginated::new(logs_list, total, &params)))
}

pub async fn get_admin_stats_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = analytics::admin_stats(&state.db_pool).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": stats })))
}
