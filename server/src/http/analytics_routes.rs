use crate::auth::{require_role, Claims};
use crate::db::analytics;
use crate::db::models::Role;
use crate::http::{ApiError, AppState};
use axum::{extract::State, response::IntoResponse, Extension, Json};

pub async fn client_analytics_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&claims, Role::Client)?;
    let data = analytics::client_analytics(&state.db_pool, &claims.sub).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": data })))
}

pub async fn transporteur_analytics_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&claims, Role::Transporteur)?;
    let data = analytics::transporteur_analytics(&state.db_pool, &claims.sub).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": data })))
}

pub async fn platform_analytics_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&claims, Role::Admin)?;
    let data = analytics::platform_analytics(&state.db_pool).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": data })))
}
