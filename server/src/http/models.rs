use crate::db::models::{Role, User};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

// User Response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub nom: String,
    pub prenom: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telephone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entreprise: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub role: Role,
    pub note_moyenne: f64,
    pub nombre_avis: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            nom: u.nom,
            prenom: u.prenom,
            telephone: u.telephone,
            entreprise: u.entreprise,
            avatar: u.avatar,
            role: u.role,
            note_moyenne: u.note_moyenne,
            nombre_avis: u.nombre_avis,
            is_active: u.is_active,
            created_at: u.created_at,
        }
    }
}

/// Profil visible par les autres utilisateurs (sans email ni téléphone).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: String,
    pub nom: String,
    pub prenom: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entreprise: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub role: Role,
    pub note_moyenne: f64,
    pub nombre_avis: i64,
    pub created_at: DateTime<Utc>,
}

impl From<User> for PublicProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            nom: u.nom,
            prenom: u.prenom,
            entreprise: u.entreprise,
            avatar: u.avatar,
            role: u.role,
            note_moyenne: u.note_moyenne,
            nombre_avis: u.nombre_avis,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageParams {
    pub const DEFAULT_LIMIT: i64 = 10;
    pub const MAX_LIMIT: i64 = 100;

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T: Serialize> {
    pub success: bool,
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub pages: i64,
    pub limit: i64,
}

impl<T: Serialize> Paginated<T> {
    pub fn new(data: Vec<T>, total: i64, params: &PageParams) -> Self {
        let limit = params.limit();
        Self {
            success: true,
            data,
            total,
            page: params.page(),
            pages: (total + limit - 1) / limit,
            limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_params_defaults_and_bounds() {
        let params = PageParams::default();
        assert_eq!((params.page(), params.limit(), params.offset()), (1, 10, 0));

        let params = PageParams { page: Some(3), limit: Some(500) };
        assert_eq!(params.limit(), 100);
        assert_eq!(params.offset(), 200);

        let params = PageParams { page: Some(-2), limit: Some(0) };
        assert_eq!((params.page(), params.limit()), (1, 1));
    }

    #[test]
    fn test_offset_saturates_on_huge_page() {
        let params = PageParams { page: Some(i64::MAX), limit: Some(100) };
        assert_eq!(params.offset(), i64::MAX);
        let params = PageParams { page: Some(i64::MAX), limit: Some(1) };
        assert_eq!(params.offset(), i64::MAX - 1);
    }

    #[test]
    fn test_paginated_page_count() {
        let params = PageParams { page: Some(1), limit: Some(10) };
        let page = Paginated::new(vec![1, 2, 3], 21, &params);
        assert_eq!(page.pages, 3);
        let empty: Paginated<i32> = Paginated::new(vec![], 0, &params);
        assert_eq!(empty.pages, 0);
    }
}
