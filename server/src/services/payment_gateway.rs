use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tokio::sync::Mutex;

const STRIPE_API: &str = "https://api.stripe.com/v1";

/// Écart maximal accepté entre l'horodatage signé d'un webhook et l'heure locale.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Declined(String),
    #[error("intention de paiement introuvable: {0}")]
    NotFound(String),
    #[error("erreur du prestataire de paiement ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("prestataire de paiement injoignable: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    /// En attente d'une action du payeur (saisie de carte, 3-D Secure...).
    Pending,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: IntentStatus,
    pub failure_message: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &str;

    /// `amount` en centimes.
    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        metadata: &[(&str, &str)],
    ) -> Result<PaymentIntent, GatewayError>;

    async fn retrieve_intent(&self, id: &str) -> Result<PaymentIntent, GatewayError>;
}

pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(secret_key: String) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self { client, secret_key })
    }

    async fn parse(response: reqwest::Response) -> Result<PaymentIntent, GatewayError> {
        let status = response.status();
        if status.is_success() {
            let intent: StripeIntent = response.json().await?;
            return Ok(intent.into());
        }

        let message = response
            .json::<StripeErrorBody>()
            .await
            .map(|body| body.error.message.unwrap_or_default())
            .unwrap_or_default();

        match status.as_u16() {
            402 => Err(GatewayError::Declined(if message.is_empty() {
                "Paiement refusé".to_string()
            } else {
                message
            })),
            404 => Err(GatewayError::NotFound(message)),
            code => Err(GatewayError::Api { status: code, message }),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn name(&self) -> &str {
        "stripe"
    }

    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        metadata: &[(&str, &str)],
    ) -> Result<PaymentIntent, GatewayError> {
        let mut form: Vec<(String, String)> = vec![
            ("amount".to_string(), amount.to_string()),
            ("currency".to_string(), currency.to_string()),
            ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
        ];
        for (key, value) in metadata {
            form.push((format!("metadata[{}]", key), value.to_string()));
        }

        let response = self
            .client
            .post(format!("{}/payment_intents", STRIPE_API))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;

        let intent = Self::parse(response).await?;
        tracing::info!("💳 Intention Stripe créée: {}", intent.id);
        Ok(intent)
    }

    async fn retrieve_intent(&self, id: &str) -> Result<PaymentIntent, GatewayError> {
        let response = self
            .client
            .get(format!("{}/payment_intents/{}", STRIPE_API, id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        Self::parse(response).await
    }
}

#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    client_secret: Option<String>,
    amount: i64,
    currency: String,
    status: String,
    last_payment_error: Option<StripeErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl From<StripeIntent> for PaymentIntent {
    fn from(intent: StripeIntent) -> Self {
        let failure_message = intent.last_payment_error.and_then(|e| e.message);
        let status = match intent.status.as_str() {
            "succeeded" => IntentStatus::Succeeded,
            "processing" => IntentStatus::Processing,
            "canceled" => IntentStatus::Canceled,
            "requires_payment_method" if failure_message.is_some() => IntentStatus::Failed,
            _ => IntentStatus::Pending,
        };
        Self {
            id: intent.id,
            client_secret: intent.client_secret,
            amount: intent.amount,
            currency: intent.currency,
            status,
            failure_message,
        }
    }
}

/// Passerelle de développement: toute intention créée est aussitôt réglée.
#[derive(Default)]
pub struct SimulatedGateway {
    intents: Mutex<HashMap<String, PaymentIntent>>,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    fn name(&self) -> &str {
        "simulation"
    }

    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        _metadata: &[(&str, &str)],
    ) -> Result<PaymentIntent, GatewayError> {
        if amount <= 0 {
            return Err(GatewayError::Declined("Montant invalide".to_string()));
        }
        let id = format!("pi_sim_{}", uuid::Uuid::new_v4().simple());
        let intent = PaymentIntent {
            client_secret: Some(format!("{}_secret", id)),
            id: id.clone(),
            amount,
            currency: currency.to_string(),
            status: IntentStatus::Succeeded,
            failure_message: None,
        };
        self.intents.lock().await.insert(id, intent.clone());
        tracing::debug!("💳 Intention simulée créée: {}", intent.id);
        Ok(intent)
    }

    async fn retrieve_intent(&self, id: &str) -> Result<PaymentIntent, GatewayError> {
        self.intents
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("en-tête Stripe-Signature invalide")]
    Malformed,
    #[error("horodatage hors tolérance")]
    Expired,
    #[error("signature invalide")]
    Mismatch,
}

fn compute_signature(payload: &[u8], secret: &str, timestamp: i64) -> Option<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Construit un en-tête `Stripe-Signature` (`t=...,v1=...`).
pub fn sign_webhook(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let signature = compute_signature(payload, secret, timestamp).unwrap_or_default();
    format!("t={},v1={}", timestamp, signature)
}

/// Vérifie un en-tête `Stripe-Signature`: HMAC-SHA256 de `"{t}.{corps}"`.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| SignatureError::Malformed)?)
            }
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if now.abs_diff(timestamp) > WEBHOOK_TOLERANCE_SECS.unsigned_abs() {
        return Err(SignatureError::Expired);
    }

    let expected = compute_signature(payload, secret, timestamp).ok_or(SignatureError::Mismatch)?;
    let matched = signatures
        .iter()
        .any(|candidate| bool::from(candidate.as_bytes().ct_eq(expected.as_bytes())));

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Événement webhook réduit aux champs utilisés.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: WebhookObject,
}

#[derive(Debug, Deserialize)]
pub struct WebhookObject {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    #[test]
    fn test_signature_roundtrip() {
        let body = br#"{"type":"payment_intent.succeeded"}"#;
        let header = sign_webhook(body, SECRET, 1_700_000_000);
        assert!(verify_webhook_signature(body, &header, SECRET, 1_700_000_100).is_ok());
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let header = sign_webhook(b"original", SECRET, 1_700_000_000);
        assert_eq!(
            verify_webhook_signature(b"modifie", &header, SECRET, 1_700_000_000),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_webhook_signature(b"original", &header, "autre", 1_700_000_000),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_signature_tolerance_and_format() {
        let header = sign_webhook(b"x", SECRET, 1_700_000_000);
        assert_eq!(
            verify_webhook_signature(b"x", &header, SECRET, 1_700_000_000 + 301),
            Err(SignatureError::Expired)
        );
        assert_eq!(
            verify_webhook_signature(b"x", "v1=abc", SECRET, 0),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_webhook_signature(b"x", "t=abc,v1=abc", SECRET, 0),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn test_extreme_timestamps_are_expired() {
        for t in [i64::MIN, i64::MAX] {
            let header = format!("t={},v1=00", t);
            assert_eq!(
                verify_webhook_signature(b"x", &header, SECRET, 1_700_000_000),
                Err(SignatureError::Expired)
            );
        }
        let header = format!("t={},v1=00", i64::MIN);
        assert_eq!(
            verify_webhook_signature(b"x", &header, SECRET, i64::MAX),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_stripe_status_mapping() {
        let intent = StripeIntent {
            id: "pi_1".to_string(),
            client_secret: None,
            amount: 1000,
            currency: "eur".to_string(),
            status: "requires_payment_method".to_string(),
            last_payment_error: Some(StripeErrorDetail {
                message: Some("Carte refusée".to_string()),
            }),
        };
        let intent = PaymentIntent::from(intent);
        assert_eq!(intent.status, IntentStatus::Failed);
        assert_eq!(intent.failure_message.as_deref(), Some("Carte refusée"));
    }

    #[tokio::test]
    async fn test_simulated_gateway() {
        let gateway = SimulatedGateway::new();
        let intent = gateway.create_intent(12000, "eur", &[]).await.unwrap();
        let fetched = gateway.retrieve_intent(&intent.id).await.unwrap();
        assert_eq!(fetched.status, IntentStatus::Succeeded);
        assert_eq!(fetched.amount, 12000);
        assert!(matches!(
            gateway.retrieve_intent("pi_inconnu").await,
            Err(GatewayError::NotFound(_))
        ));
    }
}
