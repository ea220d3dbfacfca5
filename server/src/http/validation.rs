use crate::http::ApiError;
use uuid::Uuid;

/// Accumule les erreurs de validation d'une requête puis les renvoie en bloc.
#[derive(Debug, Default)]
pub struct Checks {
    errors: Vec<String>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(&mut self, condition: bool, message: &str) -> &mut Self {
        if !condition {
            self.errors.push(message.to_string());
        }
        self
    }

    pub fn not_blank(&mut self, value: &str, field: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.errors.push(format!("Le champ {} est requis", field));
        }
        self
    }

    pub fn length(&mut self, value: &str, min: usize, max: usize, field: &str) -> &mut Self {
        let len = value.trim().chars().count();
        if len < min || len > max {
            self.errors.push(format!(
                "Le champ {} doit contenir entre {} et {} caractères",
                field, min, max
            ));
        }
        self
    }

    pub fn positive(&mut self, value: f64, field: &str) -> &mut Self {
        if !value.is_finite() || value <= 0.0 {
            self.errors.push(format!("Le champ {} doit être positif", field));
        }
        self
    }

    pub fn email(&mut self, value: &str) -> &mut Self {
        if !is_valid_email(value) {
            self.errors.push("Adresse email invalide".to_string());
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(std::mem::take(&mut self.errors)))
        }
    }
}

pub fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.trim().split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.contains(char::is_whitespace)
}

/// Les identifiants sont des UUID; tout le reste est un 400.
pub fn parse_id(raw: &str) -> Result<String, ApiError> {
    Uuid::parse_str(raw)
        .map(|id| id.to_string())
        .map_err(|_| ApiError::BadRequest("Identifiant invalide".to_string()))
}
