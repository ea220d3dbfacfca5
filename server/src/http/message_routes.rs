use crate::auth::Claims;
use crate::db::models::{Message, NotificationKind};
use crate::db::{annonces, messages, users};
use crate::http::models::PublicProfile;
use crate::http::validation::{parse_id, Checks};
use crate::http::{ApiError, AppState};
use crate::services::{notify, Notice};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(alias = "destinataire_id")]
    pub destinataire_id: String,
    #[serde(alias = "annonce_id")]
    pub annonce_id: Option<String>,
    pub contenu: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub interlocuteur: Option<PublicProfile>,
    pub dernier_message: Message,
    pub non_lus: i64,
}

pub async fn send_message_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Checks::new()
        .length(&req.contenu, 1, 2000, "contenu")
        .finish()?;

    let destinataire_id = parse_id(&req.destinataire_id)?;
    if destinataire_id == claims.sub {
        return Err(ApiError::BadRequest(
            "Vous ne pouvez pas vous envoyer un message".to_string(),
        ));
    }
    let destinataire = users::get_user_by_id(&state.db_pool, &destinataire_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::not_found("Destinataire"))?;

    let annonce_id = match req.annonce_id.as_deref() {
        Some(raw) => {
            let id = parse_id(raw)?;
            annonces::get_annonce_by_id(&state.db_pool, &id)
                .await?
                .ok_or_else(|| ApiError::not_found("Annonce"))?;
            Some(id)
        }
        None => None,
    };

    let message = messages::create_message(
        &state.db_pool,
        &claims.sub,
        &destinataire.id,
        annonce_id.as_deref(),
        req.contenu.trim(),
    )
    .await?;

    let mut notice = Notice::new(
        &destinataire.id,
        NotificationKind::Message,
        "Nouveau message",
        format!("Vous avez reçu un message de {}.", claims.email),
    );
    if let Some(id) = annonce_id.as_deref() {
        notice = notice.annonce(id);
    }
    notify(&state.db_pool, notice).await;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "data": message })),
    ))
}

pub async fn conversations_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let latest = messages::latest_per_counterpart(&state.db_pool, &claims.sub).await?;
    let unread = messages::unread_by_sender(&state.db_pool, &claims.sub).await?;

    let mut conversations = Vec::with_capacity(latest.len());
    for message in latest {
        let other = if message.expediteur_id == claims.sub {
            message.destinataire_id.clone()
        } else {
            message.expediteur_id.clone()
        };
        let interlocuteur = users::get_user_by_id(&state.db_pool, &other)
            .await?
            .map(PublicProfile::from);
        conversations.push(ConversationSummary {
            interlocuteur,
            non_lus: unread.get(&other).copied().unwrap_or(0),
            dernier_message: message,
        });
    }

    Ok(Json(serde_json::json!({ "success": true, "data": conversations })))
}

pub async fn conversation_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let other_id = parse_id(&user_id)?;
    let other = users::get_user_by_id(&state.db_pool, &other_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Utilisateur"))?;

    let thread = messages::conversation(&state.db_pool, &claims.sub, &other.id).await?;
    let marked = messages::mark_conversation_read(&state.db_pool, &claims.sub, &other.id).await?;
    if marked > 0 {
        tracing::debug!("📨 {} message(s) marqué(s) lu(s) pour {}", marked, claims.sub);
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "data": {
            "interlocuteur": PublicProfile::from(other),
            "messages": thread,
        },
    })))
}

pub async fn unread_count_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let count = messages::unread_count(&state.db_pool, &claims.sub).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": { "count": count } })))
}

pub async fn delete_message_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let message = messages::get_message_by_id(&state.db_pool, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Message"))?;
    if message.expediteur_id != claims.sub {
        return Err(ApiError::Forbidden(
            "Seul l'expéditeur peut supprimer ce message".to_string(),
        ));
    }

    messages::delete_message(&state.db_pool, &message.id).await?;
    Ok(Json(serde_json::json!({ "success": true, "message": "Message supprimé" })))
}
