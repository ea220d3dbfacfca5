pub mod hash;
pub mod jwt;
pub mod middleware;

pub use hash::{hash_password, hash_token, verify_password};
pub use jwt::{create_token, verify_token, Claims};
pub use middleware::{admin_middleware, auth_middleware};

use crate::db::models::Role;
use crate::http::ApiError;

/// Vérifie le rôle porté par le token.
pub fn require_role(claims: &Claims, role: Role) -> Result<(), ApiError> {
    if claims.role == role {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "Action réservée au rôle {}",
            role
        )))
    }
}
