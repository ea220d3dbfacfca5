use protrans_server::config::Config;
use protrans_server::db::{create_pool, run_migrations};
use protrans_server::http::{create_router, AppState};
use protrans_server::services::{FileStorage, PaymentGateway, SimulatedGateway, StripeGateway};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    match dotenvy::dotenv() {
        Ok(path) => eprintln!("✅ .env chargé depuis {:?}", path),
        Err(e) => eprintln!("⚠️  .env introuvable: {}", e),
    }

    let config = Arc::new(Config::from_env()?);

    // Logging setup
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},protrans_server=debug", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Démarrage du serveur Pro-Trans...");
    tracing::info!("✅ Configuration chargée");
    if config.uses_dev_jwt_secret() {
        tracing::warn!("⚠️  JWT_SECRET absent, secret de développement utilisé");
    }
    tracing::info!("   HTTP Addr: {}", config.http_addr);
    tracing::info!("   Uploads: {} (max {} octets)", config.upload_dir, config.max_upload_bytes);
    tracing::info!(
        "   SMTP: {}",
        if config.smtp_configured() { "configuré" } else { "désactivé (emails journalisés)" }
    );

    tracing::info!("📊 Connexion à la base: {}", config.database_url);
    let db_pool = create_pool(&config.database_url).await.map_err(|e| {
        tracing::error!("❌ Connexion à la base impossible: {}", e);
        e
    })?;

    if let Err(e) = run_migrations(&db_pool).await {
        tracing::error!("❌ Échec des migrations: {}", e);
        return Err(e.into());
    }
    tracing::info!("✅ Migrations appliquées");

    let storage = FileStorage::new(&config.upload_dir, config.max_upload_bytes).await?;

    let gateway: Arc<dyn PaymentGateway> = match &config.stripe_secret_key {
        Some(key) => Arc::new(StripeGateway::new(key.clone())?),
        None => {
            tracing::warn!("⚠️ STRIPE_SECRET_KEY absent: paiements simulés");
            Arc::new(SimulatedGateway::new())
        }
    };
    tracing::info!("💳 Passerelle de paiement: {}", gateway.name());
    if config.stripe_webhook_secret.is_none() {
        tracing::warn!("⚠️ STRIPE_WEBHOOK_SECRET absent: webhooks refusés");
    }

    let state = AppState::new(config.clone(), db_pool, gateway, storage);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    tracing::info!("🌐 Serveur à l'écoute: http://{}", config.http_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
