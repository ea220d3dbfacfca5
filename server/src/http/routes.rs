use crate::auth::{admin_middleware, auth_middleware};
use crate::http::admin_routes::{
    delete_user_handler, get_activity_logs_handler, get_admin_stats_handler, get_annonces_handler,
    get_user_handler, get_users_handler, set_user_status_handler,
};
use crate::http::analytics_routes::{
    client_analytics_handler, platform_analytics_handler, transporteur_analytics_handler,
};
use crate::http::annonce_routes::{
    cancel_annonce_handler, create_annonce_handler, delete_annonce_handler, delete_photo_handler,
    get_annonce_handler, list_annonces_handler, my_annonces_handler, update_annonce_handler,
    upload_photos_handler, MAX_PHOTOS,
};
use crate::http::auth_routes::{
    forgot_password_handler, login_handler, me_handler, register_handler, reset_password_handler,
};
use crate::http::avis_routes::{create_avis_handler, my_avis_handler, user_avis_handler};
use crate::http::dashboard_routes::dashboard_handler;
use crate::http::devis_routes::{
    accept_devis_handler, annonce_devis_handler, cancel_devis_handler, create_devis_handler,
    get_devis_handler, my_devis_handler, refuse_devis_handler, update_devis_handler,
};
use crate::http::dispute_routes::{
    add_dispute_message_handler, admin_list_disputes_handler, admin_resolve_dispute_handler,
    admin_review_dispute_handler, cancel_dispute_handler, get_dispute_handler,
    my_disputes_handler, open_dispute_handler,
};
use crate::http::message_routes::{
    conversation_handler, conversations_handler, delete_message_handler, send_message_handler,
    unread_count_handler,
};
use crate::http::notification_routes::{
    delete_notification_handler, list_notifications_handler, mark_all_read_handler,
    mark_read_handler, unread_notifications_handler,
};
use crate::http::payment_routes::{
    confirm_payment_handler, create_intent_handler, get_payment_handler, invoice_pdf_handler,
    my_payments_handler, webhook_handler,
};
use crate::http::rate_limit::rate_limit_middleware;
use crate::http::tracking_routes::{
    confirm_reception_handler, get_tracking_handler, report_issue_handler, update_tracking_handler,
};
use crate::http::user_routes::{
    change_password_handler, get_profile_handler, update_profile_handler, upload_avatar_handler,
};
use crate::http::{AppState, HealthResponse};
use crate::services::storage::PUBLIC_PREFIX;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use std::time::SystemTime;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Marge pour les champs texte d'un formulaire multipart.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: AppState) -> Router {
    // Authentification publique, limitée par IP
    let auth_routes = Router::new()
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/forgot-password", post(forgot_password_handler))
        .route("/api/auth/reset-password", post(reset_password_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/api/annonces", get(list_annonces_handler))
        .route("/api/annonces/:id", get(get_annonce_handler))
        .route("/api/users/:id", get(get_profile_handler))
        .route("/api/avis/user/:user_id", get(user_avis_handler))
        .route("/api/payments/webhook", post(webhook_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/api/auth/me", get(me_handler))
        .route("/api/users/profile", put(update_profile_handler))
        .route("/api/users/password", put(change_password_handler))
        .route("/api/users/avatar", post(upload_avatar_handler))
        // Annonces
        .route("/api/annonces", post(create_annonce_handler))
        .route("/api/annonces/mine", get(my_annonces_handler))
        .route(
            "/api/annonces/:id",
            put(update_annonce_handler).delete(delete_annonce_handler),
        )
        .route("/api/annonces/:id/cancel", post(cancel_annonce_handler))
        .route("/api/annonces/:id/photos", post(upload_photos_handler))
        .route(
            "/api/annonces/:id/photos/:photo_id",
            axum::routing::delete(delete_photo_handler),
        )
        // Devis
        .route("/api/devis", post(create_devis_handler))
        .route("/api/devis/mine", get(my_devis_handler))
        .route("/api/devis/annonce/:annonce_id", get(annonce_devis_handler))
        .route("/api/devis/:id", get(get_devis_handler).put(update_devis_handler))
        .route("/api/devis/:id/accept", post(accept_devis_handler))
        .route("/api/devis/:id/refuse", post(refuse_devis_handler))
        .route("/api/devis/:id/cancel", post(cancel_devis_handler))
        // Suivi
        .route(
            "/api/tracking/:annonce_id",
            get(get_tracking_handler).post(update_tracking_handler),
        )
        .route("/api/tracking/:annonce_id/confirm", post(confirm_reception_handler))
        .route("/api/tracking/:annonce_id/issue", post(report_issue_handler))
        // Paiements
        .route("/api/payments/intent", post(create_intent_handler))
        .route("/api/payments/mine", get(my_payments_handler))
        .route("/api/payments/:id", get(get_payment_handler))
        .route("/api/payments/:id/confirm", post(confirm_payment_handler))
        .route("/api/payments/:id/invoice", get(invoice_pdf_handler))
        // Messagerie
        .route("/api/messages", post(send_message_handler))
        .route("/api/messages/conversations", get(conversations_handler))
        .route("/api/messages/conversation/:user_id", get(conversation_handler))
        .route("/api/messages/unread-count", get(unread_count_handler))
        .route("/api/messages/:id", axum::routing::delete(delete_message_handler))
        // Avis
        .route("/api/avis", post(create_avis_handler))
        .route("/api/avis/mine", get(my_avis_handler))
        // Litiges
        .route("/api/disputes", post(open_dispute_handler))
        .route("/api/disputes/mine", get(my_disputes_handler))
        .route("/api/disputes/:id", get(get_dispute_handler))
        .route("/api/disputes/:id/messages", post(add_dispute_message_handler))
        .route("/api/disputes/:id/cancel", post(cancel_dispute_handler))
        // Notifications
        .route("/api/notifications", get(list_notifications_handler))
        .route("/api/notifications/unread-count", get(unread_notifications_handler))
        .route("/api/notifications/read-all", put(mark_all_read_handler))
        .route("/api/notifications/:id/read", put(mark_read_handler))
        .route(
            "/api/notifications/:id",
            axum::routing::delete(delete_notification_handler),
        )
        // Statistiques
        .route("/api/analytics/client", get(client_analytics_handler))
        .route("/api/analytics/transporteur", get(transporteur_analytics_handler))
        .route("/api/analytics/platform", get(platform_analytics_handler))
        .route("/api/dashboard", get(dashboard_handler))
        .layer(middleware::from_fn_with_state(
            state.jwt_secret.clone(),
            auth_middleware,
        ));

    // Admin routes
    let admin_routes = Router::new()
        .route("/api/admin/users", get(get_users_handler))
        .route(
            "/api/admin/users/:id",
            get(get_user_handler).delete(delete_user_handler),
        )
        .route("/api/admin/users/:id/status", put(set_user_status_handler))
        .route("/api/admin/annonces", get(get_annonces_handler))
        .route("/api/admin/stats", get(get_admin_stats_handler))
        .route("/api/admin/logs", get(get_activity_logs_handler))
        .route("/api/admin/disputes", get(admin_list_disputes_handler))
        .route("/api/admin/disputes/:id/review", put(admin_review_dispute_handler))
        .route("/api/admin/disputes/:id/resolve", put(admin_resolve_dispute_handler))
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.jwt_secret.clone(),
            auth_middleware,
        ));

    let body_limit = state.config.max_upload_bytes * MAX_PHOTOS + MULTIPART_OVERHEAD;
    let uploads = ServeDir::new(state.storage.base_path());

    auth_routes
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .nest_service(PUBLIC_PREFIX, uploads)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = SystemTime::now()
        .duration_since(state.start_time)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let response = HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        timestamp: Utc::now(),
    };

    (StatusCode::OK, Json(response))
}
