use std::env;

const DEV_JWT_SECRET: &str = "dev-secret-change-in-production";

#[derive(Debug, Clone)]
pub struct Config {
    pub http_addr: String,
    pub log_level: String,
    pub database_url: String,

    // Auth
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub bcrypt_cost: u32,
    pub rate_limit_per_minute: usize,

    // Uploads
    pub upload_dir: String,
    pub max_upload_bytes: usize,

    // SMTP
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub email_from: String,
    pub frontend_url: String,

    // Stripe
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub payment_currency: String,
    pub tva_rate: f64,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL manquant (ex: DATABASE_URL=sqlite://protrans.db)")?;

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => DEV_JWT_SECRET.to_string(),
        };

        Ok(Config {
            http_addr: env::var("HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            database_url,

            jwt_secret,
            jwt_expiry_hours: parse_or("JWT_EXPIRY_HOURS", 24),
            bcrypt_cost: parse_or("BCRYPT_COST", bcrypt::DEFAULT_COST),
            rate_limit_per_minute: parse_or("RATE_LIMIT_PER_MINUTE", 20),

            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", 5 * 1024 * 1024),

            smtp_host: non_empty("SMTP_HOST"),
            smtp_port: parse_or("SMTP_PORT", 587),
            smtp_user: non_empty("SMTP_USER"),
            smtp_password: non_empty("SMTP_PASSWORD"),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Pro-Trans <noreply@pro-trans.fr>".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),

            stripe_secret_key: non_empty("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: non_empty("STRIPE_WEBHOOK_SECRET"),
            payment_currency: env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "eur".to_string()),
            tva_rate: parse_or("TVA_RATE", 0.20),
        })
    }

    /// Configuration minimale pour les tests: base en mémoire, aucun service externe.
    pub fn for_tests(upload_dir: &str) -> Self {
        Config {
            http_addr: "127.0.0.1:0".to_string(),
            log_level: "debug".to_string(),
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "test-secret".to_string(),
            jwt_expiry_hours: 1,
            bcrypt_cost: 4,
            rate_limit_per_minute: 1000,
            upload_dir: upload_dir.to_string(),
            max_upload_bytes: 1024 * 1024,
            smtp_host: None,
            smtp_port: 587,
            smtp_user: None,
            smtp_password: None,
            email_from: "Pro-Trans <test@pro-trans.fr>".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            stripe_secret_key: None,
            stripe_webhook_secret: Some("whsec_test".to_string()),
            payment_currency: "eur".to_string(),
            tva_rate: 0.20,
        }
    }

    pub fn uses_dev_jwt_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    pub fn smtp_configured(&self) -> bool {
        self.smtp_host.is_some() && self.smtp_user.is_some() && self.smtp_password.is_some()
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
