use crate::services::{GatewayError, PdfError, StorageError};
use crate::workflow::TransitionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Erreur interne du serveur")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{} introuvable", what))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        let (errors, error) = match self {
            ApiError::Validation(errors) => (Some(errors), None),
            ApiError::Internal(detail) => {
                tracing::error!("❌ Erreur interne: {}", detail);
                (None, cfg!(debug_assertions).then_some(detail))
            }
            _ => (None, None),
        };

        let body = ErrorResponse {
            success: false,
            message,
            errors,
            error,
        };

        (status, Json(body)).into_response()
    }
}

pub const CONFLICT_MESSAGE: &str = "L'annonce a été modifiée entre-temps, veuillez réessayer";

/// SQLITE_BUSY (5) ou SQLITE_LOCKED (6), codes étendus compris.
fn is_busy_or_locked(code: &str) -> bool {
    code.parse::<i32>()
        .map(|c| matches!(c & 0xff, 5 | 6))
        .unwrap_or(false)
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Ressource introuvable".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ApiError::BadRequest("Cette ressource existe déjà".to_string())
            }
            sqlx::Error::Database(db) if db.code().is_some_and(|c| is_busy_or_locked(&c)) => {
                tracing::warn!("⚠️ Base occupée: {}", db.message());
                ApiError::BadRequest(CONFLICT_MESSAGE.to_string())
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<TransitionError> for ApiError {
    fn from(err: TransitionError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<bcrypt::BcryptError> for ApiError {
    fn from(err: bcrypt::BcryptError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(_) => ApiError::Internal(err.to_string()),
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Declined(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<PdfError> for ApiError {
    fn from(err: PdfError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        ApiError::BadRequest(format!("Formulaire multipart invalide: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_is_joined() {
        let err = ApiError::Validation(vec!["titre requis".to_string(), "poids invalide".to_string()]);
        assert_eq!(err.to_string(), "titre requis, poids invalide");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_busy_codes() {
        assert!(is_busy_or_locked("5"));
        assert!(is_busy_or_locked("6"));
        assert!(is_busy_or_locked("517"));
        assert!(is_busy_or_locked("262"));
        assert!(!is_busy_or_locked("2067"));
        assert!(!is_busy_or_locked("HY000"));
    }

    #[tokio::test]
    async fn test_locked_database_is_a_conflict() {
        use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
        use sqlx::Connection;

        let dir = tempfile::tempdir().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("verrou.db"))
            .create_if_missing(true)
            .busy_timeout(std::time::Duration::ZERO);
        let mut first = SqliteConnection::connect_with(&options).await.unwrap();
        let mut second = SqliteConnection::connect_with(&options).await.unwrap();
        sqlx::query("CREATE TABLE t (x INTEGER)").execute(&mut first).await.unwrap();

        sqlx::query("BEGIN IMMEDIATE").execute(&mut first).await.unwrap();
        let err = sqlx::query("INSERT INTO t (x) VALUES (1)")
            .execute(&mut second)
            .await
            .unwrap_err();

        let err: ApiError = err.into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), CONFLICT_MESSAGE);
    }

    #[test]
    fn test_transition_error_is_bad_request() {
        let err: ApiError = TransitionError::QuoteExpired.into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Ce devis a expiré");
    }

    #[test]
    fn test_row_not_found_is_404() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
