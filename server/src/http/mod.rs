pub mod admin_routes;
pub mod analytics_routes;
pub mod annonce_routes;
pub mod auth_routes;
pub mod avis_routes;
pub mod dashboard_routes;
pub mod devis_routes;
pub mod dispute_routes;
pub mod errors;
pub mod message_routes;
pub mod models;
pub mod notification_routes;
pub mod payment_routes;
pub mod rate_limit;
pub mod routes;
pub mod shipment;
pub mod state;
pub mod tracking_routes;
pub mod uploads;
pub mod user_routes;
pub mod validation;

pub use errors::ApiError;
pub use models::*;
pub use routes::create_router;
pub use state::AppState;
