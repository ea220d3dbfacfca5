use crate::http::{ApiError, AppState};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const WINDOW: Duration = Duration::from_secs(60);

/// Fenêtre glissante d'une minute par adresse IP.
#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<Mutex<HashMap<String, Vec<Instant>>>>,
    max_requests_per_minute: usize,
}

impl RateLimiter {
    pub fn new(max_requests_per_minute: usize) -> Self {
        Self {
            requests: Arc::new(Mutex::new(HashMap::new())),
            max_requests_per_minute,
        }
    }

    pub async fn check_rate_limit(&self, ip: &str) -> bool {
        self.check_at(ip, Instant::now()).await
    }

    async fn check_at(&self, ip: &str, now: Instant) -> bool {
        let mut requests = self.requests.lock().await;

        // Purge des adresses inactives pour borner la mémoire
        requests.retain(|_, times| {
            times.retain(|&t| now.duration_since(t) < WINDOW);
            !times.is_empty()
        });

        let ip_requests = requests.entry(ip.to_string()).or_default();
        if ip_requests.len() >= self.max_requests_per_minute {
            return false;
        }

        ip_requests.push(now);
        true
    }
}

fn client_ip(req: &Request) -> String {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.split(',').next())
        .map(|ip| ip.trim().to_string())
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = client_ip(&req);

    if !state.rate_limiter.check_rate_limit(&ip).await {
        tracing::warn!("🚫 Limite de requêtes atteinte pour {}", ip);
        let body = Json(serde_json::json!({
            "success": false,
            "message": "Trop de tentatives, réessayez dans une minute",
        }));
        return Ok((StatusCode::TOO_MANY_REQUESTS, body).into_response());
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_limit_per_ip() {
        let limiter = RateLimiter::new(2);
        let now = Instant::now();
        assert!(limiter.check_at("1.1.1.1", now).await);
        assert!(limiter.check_at("1.1.1.1", now).await);
        assert!(!limiter.check_at("1.1.1.1", now).await);
        assert!(limiter.check_at("2.2.2.2", now).await);
    }

    #[tokio::test]
    async fn test_window_slides() {
        let limiter = RateLimiter::new(1);
        let start = Instant::now();
        assert!(limiter.check_at("1.1.1.1", start).await);
        assert!(!limiter.check_at("1.1.1.1", start + Duration::from_secs(30)).await);
        assert!(limiter.check_at("1.1.1.1", start + Duration::from_secs(61)).await);
    }
}
