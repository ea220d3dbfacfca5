use crate::config::Config;
use crate::utils::mask::mask_email;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("adresse invalide: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("message invalide: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("envoi SMTP échoué: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Envoi des emails transactionnels. Sans SMTP configuré, les envois sont ignorés.
pub struct EmailService {
    from: String,
    frontend_url: String,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl EmailService {
    pub fn new(config: &Config) -> Self {
        let transport = match (&config.smtp_host, &config.smtp_user, &config.smtp_password) {
            (Some(host), Some(user), Some(password)) => {
                match AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host) {
                    Ok(builder) => {
                        tracing::info!("✅ Service email prêt ({}:{})", host, config.smtp_port);
                        Some(
                            builder
                                .port(config.smtp_port)
                                .credentials(Credentials::new(user.clone(), password.clone()))
                                .build(),
                        )
                    }
                    Err(e) => {
                        tracing::warn!("📧 Relais SMTP invalide ({}): {}", host, e);
                        None
                    }
                }
            }
            _ => {
                tracing::warn!("📧 Service email non configuré (identifiants SMTP manquants)");
                None
            }
        };

        Self {
            from: config.email_from.clone(),
            frontend_url: config.frontend_url.trim_end_matches('/').to_string(),
            transport,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    async fn send(&self, to: &str, subject: &str, html: String) -> Result<(), EmailError> {
        let Some(transport) = &self.transport else {
            tracing::debug!("Email ignoré (SMTP non configuré): {} -> {}", subject, mask_email(to));
            return Ok(());
        };

        let message = Message::builder()
            .from(self.from.parse::<Mailbox>()?)
            .to(to.parse::<Mailbox>()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)?;

        transport.send(message).await?;
        tracing::info!("📧 Email envoyé: {} -> {}", subject, mask_email(to));
        Ok(())
    }

    /// Un échec d'envoi est journalisé puis ignoré.
    pub async fn send_best_effort(&self, to: &str, subject: &str, html: String) {
        if let Err(e) = self.send(to, subject, html).await {
            tracing::warn!("⚠️ Email non envoyé à {} ({}): {}", mask_email(to), subject, e);
        }
    }

    pub async fn send_welcome(&self, to: &str, prenom: &str) {
        let html = layout(
            &format!("Bienvenue {} !", prenom),
            &format!(
                "<p>Votre compte Pro-Trans est créé.</p>\
                 <p><a href=\"{}/dashboard\">Accéder à mon espace</a></p>",
                self.frontend_url
            ),
        );
        self.send_best_effort(to, "Bienvenue sur Pro-Trans", html).await;
    }

    pub async fn send_password_reset(&self, to: &str, token: &str) {
        let html = layout(
            "Réinitialisation du mot de passe",
            &format!(
                "<p>Pour choisir un nouveau mot de passe, suivez ce lien (valable 1 heure):</p>\
                 <p><a href=\"{}/reset-password?token={}\">Réinitialiser mon mot de passe</a></p>\
                 <p>Si vous n'êtes pas à l'origine de cette demande, ignorez cet email.</p>",
                self.frontend_url, token
            ),
        );
        self.send_best_effort(to, "Réinitialisation de votre mot de passe", html).await;
    }

    pub async fn send_devis_accepted(&self, to: &str, annonce_titre: &str, montant: f64) {
        let html = layout(
            "Votre devis a été accepté",
            &format!(
                "<p>Le client a accepté votre devis de <strong>{:.2} €</strong> pour \
                 l'annonce « {} ».</p>\
                 <p><a href=\"{}/dashboard\">Voir la mission</a></p>",
                montant,
                escape(annonce_titre),
                self.frontend_url
            ),
        );
        self.send_best_effort(to, "Devis accepté", html).await;
    }

    pub async fn send_tracking_update(&self, to: &str, annonce_titre: &str, etape: &str) {
        let html = layout(
            "Suivi de votre envoi",
            &format!(
                "<p>Nouvelle étape pour « {} »: <strong>{}</strong>.</p>\
                 <p><a href=\"{}/dashboard\">Suivre ma livraison</a></p>",
                escape(annonce_titre),
                etape,
                self.frontend_url
            ),
        );
        self.send_best_effort(to, "Mise à jour du suivi", html).await;
    }

    pub async fn send_payment_receipt(&self, to: &str, numero: &str, montant_ttc: f64) {
        let html = layout(
            "Paiement confirmé",
            &format!(
                "<p>Nous avons bien reçu votre paiement de <strong>{:.2} €</strong>.</p>\
                 <p>Facture n° {} disponible dans votre espace.</p>",
                montant_ttc, numero
            ),
        );
        self.send_best_effort(to, "Confirmation de paiement", html).await;
    }
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><body style=\"font-family: Arial, sans-serif\">\
         <h2>{}</h2>{}<hr><p style=\"color:#888\">Pro-Trans</p></body></html>",
        title, body
    )
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_user_content() {
        assert_eq!(escape("<b>\"Palettes\" & co</b>"), "&lt;b&gt;&quot;Palettes&quot; &amp; co&lt;/b&gt;");
    }

    #[tokio::test]
    async fn test_disabled_service_skips_sending() {
        let config = Config::for_tests("uploads");
        let service = EmailService::new(&config);
        assert!(!service.is_enabled());
        assert!(service.send("jean@exemple.fr", "Test", layout("t", "b")).await.is_ok());
    }
}
