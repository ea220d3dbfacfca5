use crate::auth::jwt::{verify_token, Claims};
use crate::http::ApiError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

pub async fn auth_middleware(
    State(jwt_secret): State<String>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // Authorization: Bearer <token>
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Token manquant".to_string()))?;

    let claims = verify_token(token, &jwt_secret)
        .map_err(|_| ApiError::Unauthorized("Token invalide ou expiré".to_string()))?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

// Admin middleware
pub async fn admin_middleware(req: Request, next: Next) -> Result<Response, ApiError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| ApiError::Unauthorized("Token manquant".to_string()))?;

    if !claims.is_admin() {
        return Err(ApiError::Forbidden(
            "Accès réservé aux administrateurs".to_string(),
        ));
    }

    Ok(next.run(req).await)
}
