use crate::auth::Claims;
use crate::db::notifications;
use crate::http::validation::parse_id;
use crate::http::{ApiError, AppState, PageParams, Paginated};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub non_lues: bool,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_notifications_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<NotificationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let params = PageParams {
        page: query.page,
        limit: query.limit,
    };
    let items = notifications::list_for_user(
        &state.db_pool,
        &claims.sub,
        query.non_lues,
        params.limit(),
        params.offset(),
    )
    .await?;
    let total = notifications::count_for_user(&state.db_pool, &claims.sub, query.non_lues).await?;

    Ok(Json(Paginated::new(items, total, &params)))
}

pub async fn unread_notifications_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let count = notifications::count_for_user(&state.db_pool, &claims.sub, true).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": { "count": count } })))
}

pub async fn mark_read_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    // Une notification d'un autre utilisateur est traitée comme absente
    let notification = notifications::mark_read(&state.db_pool, &claims.sub, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Notification"))?;

    Ok(Json(serde_json::json!({ "success": true, "data": notification })))
}

pub async fn mark_all_read_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = notifications::mark_all_read(&state.db_pool, &claims.sub).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": { "updated": updated } })))
}

pub async fn delete_notification_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    if !notifications::delete_notification(&state.db_pool, &claims.sub, &id).await? {
        return Err(ApiError::not_found("Notification"));
    }
    Ok(Json(serde_json::json!({ "success": true, "message": "Notification supprimée" })))
}
