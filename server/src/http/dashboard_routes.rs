use crate::auth::Claims;
use crate::db::annonces::{self, AnnonceFilter};
use crate::db::models::Role;
use crate::db::analytics::{self, by_statut};
use crate::db::{devis, messages, notifications};
use crate::http::{ApiError, AppState};
use axum::{extract::State, response::IntoResponse, Extension, Json};

const RECENT_LIMIT: i64 = 5;

/// Résumé d'accueil selon le rôle, avec les compteurs non lus.
pub async fn dashboard_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = &state.db_pool;
    let notifications_non_lues = notifications::count_for_user(pool, &claims.sub, true).await?;
    let messages_non_lus = messages::unread_count(pool, &claims.sub).await?;

    let resume = match claims.role {
        Role::Client => {
            let filter = AnnonceFilter {
                client_id: Some(claims.sub.clone()),
                ..Default::default()
            };
            let recentes = annonces::list_annonces(pool, &filter, RECENT_LIMIT, 0).await?;
            let par_statut = by_statut(annonces::count_by_statut(pool, Some(&claims.sub)).await?);
            serde_json::json!({
                "annoncesRecentes": recentes,
                "annoncesParStatut": par_statut,
            })
        }
        Role::Transporteur => {
            let recents = devis::list_by_transporteur(pool, &claims.sub, None, RECENT_LIMIT, 0).await?;
            let par_statut =
                by_statut(devis::count_by_statut_for_transporteur(pool, &claims.sub).await?);
            serde_json::json!({
                "devisRecents": recents,
                "devisParStatut": par_statut,
            })
        }
        Role::Admin => serde_json::json!({ "stats": analytics::admin_stats(pool).await? }),
    };

    Ok(Json(serde_json::json!({
        "success": true,
        "data": {
            "role": claims.role,
            "resume": resume,
            "notificationsNonLues": notifications_non_lues,
            "messagesNonLus": messages_non_lus,
        },
    })))
}
