use crate::config::Config;
use crate::db::DbPool;
use crate::http::rate_limit::RateLimiter;
use crate::services::{EmailService, FileStorage, PaymentGateway, PdfService};
use std::sync::Arc;
use std::time::SystemTime;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db_pool: DbPool,
    pub jwt_secret: String,
    pub email: Arc<EmailService>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub storage: FileStorage,
    pub pdf: Arc<PdfService>,
    pub rate_limiter: RateLimiter,
    pub start_time: SystemTime,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        db_pool: DbPool,
        gateway: Arc<dyn PaymentGateway>,
        storage: FileStorage,
    ) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            email: Arc::new(EmailService::new(&config)),
            pdf: Arc::new(PdfService::new()),
            rate_limiter: RateLimiter::new(config.rate_limit_per_minute),
            config,
            db_pool,
            gateway,
            storage,
            start_time: SystemTime::now(),
        }
    }
}
