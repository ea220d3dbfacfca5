#![allow(dead_code)]

use axum::body::{to_bytes, Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use protrans_server::auth::{create_token, hash_password};
use protrans_server::config::Config;
use protrans_server::db::models::Role;
use protrans_server::db::{create_pool, run_migrations, users};
use protrans_server::http::{create_router, AppState};
use protrans_server::services::{FileStorage, SimulatedGateway};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

pub const PASSWORD: &str = "motdepasse123";

const BOUNDARY: &str = "protrans-boundary";
const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _uploads: TempDir,
}

pub struct TestUser {
    pub id: String,
    pub token: String,
}

impl TestApp {
    pub async fn new() -> Self {
        let uploads = tempfile::tempdir().unwrap();
        let config = Config::for_tests(uploads.path().to_str().unwrap());

        let pool = create_pool(&config.database_url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let storage = FileStorage::new(&config.upload_dir, config.max_upload_bytes)
            .await
            .unwrap();

        let state = AppState::new(
            Arc::new(config),
            pool,
            Arc::new(SimulatedGateway::new()),
            storage,
        );
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _uploads: uploads,
        }
    }

    pub async fn raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        headers: &[(&str, &str)],
        body: Body,
    ) -> (StatusCode, HeaderMap, Bytes) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes)
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (headers, body): (&[(&str, &str)], Body) = match body {
            Some(json) => (
                &[("content-type", "application/json")],
                Body::from(json.to_string()),
            ),
            None => (&[], Body::empty()),
        };
        let (status, _, bytes) = self.raw(method, uri, token, headers, body).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn register(&self, email: &str, role: &str) -> TestUser {
        let entreprise = (role == "transporteur").then_some("Transports Martin");
        let (status, body) = self
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "email": email,
                    "password": PASSWORD,
                    "nom": "Martin",
                    "prenom": "Camille",
                    "role": role,
                    "entreprise": entreprise,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);

        TestUser {
            id: body["user"]["id"].as_str().unwrap().to_string(),
            token: body["token"].as_str().unwrap().to_string(),
        }
    }

    /// Les comptes admin ne passent pas par l'inscription publique.
    pub async fn admin(&self) -> TestUser {
        let hash = hash_password(PASSWORD, 4).unwrap();
        let user = users::create_user(
            &self.state.db_pool,
            users::NewUser {
                email: "admin@pro-trans.fr",
                password_hash: &hash,
                nom: "Admin",
                prenom: "Pro-Trans",
                telephone: None,
                entreprise: None,
                role: Role::Admin,
            },
        )
        .await
        .unwrap();
        let token = create_token(&user.id, &user.email, Role::Admin, &self.state.jwt_secret, 1).unwrap();

        TestUser { id: user.id, token }
    }

    pub async fn create_annonce(&self, client: &TestUser) -> String {
        let (status, body) = self.post("/api/annonces", &client.token, annonce_body()).await;
        assert_eq!(status, StatusCode::CREATED, "create annonce failed: {}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    pub async fn submit_devis(&self, transporteur: &TestUser, annonce_id: &str, montant: f64) -> String {
        let (status, body) = self
            .post(
                "/api/devis",
                &transporteur.token,
                json!({
                    "annonceId": annonce_id,
                    "montant": montant,
                    "delaiLivraison": (Utc::now() + Duration::days(10)).date_naive(),
                    "message": "Camion bâché disponible",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "submit devis failed: {}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    /// Envoie `count` PNG minimaux dans le champ multipart `field`.
    pub async fn upload_png(&self, uri: &str, token: &str, field: &str, count: usize) -> (StatusCode, Value) {
        let mut body = Vec::new();
        for i in 0..count {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"photo{}.png\"\r\nContent-Type: image/png\r\n\r\n",
                    BOUNDARY, field, i
                )
                .as_bytes(),
            );
            body.extend_from_slice(PNG);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        let content_type = format!("multipart/form-data; boundary={}", BOUNDARY);
        let (status, _, bytes) = self
            .raw(
                Method::POST,
                uri,
                Some(token),
                &[("content-type", content_type.as_str())],
                Body::from(body),
            )
            .await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    pub async fn track(&self, transporteur: &TestUser, annonce_id: &str, etape: &str) -> (StatusCode, Value) {
        self.post(
            &format!("/api/tracking/{}", annonce_id),
            &transporteur.token,
            json!({ "etape": etape, "localisation": "Mâcon" }),
        )
        .await
    }
}

pub fn annonce_body() -> Value {
    json!({
        "titre": "Transport de 4 palettes",
        "description": "Quatre palettes de matériel informatique, hayon nécessaire.",
        "typeMarchandise": "palettes",
        "villeDepart": "Lyon",
        "villeArrivee": "Paris",
        "dateDepart": (Utc::now() + Duration::days(3)).date_naive(),
        "poidsKg": 800.0,
        "budgetMax": 1500.0,
    })
}
