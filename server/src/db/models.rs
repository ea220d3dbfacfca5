use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Role {
    Client,
    Transporteur,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Transporteur => "transporteur",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AnnonceStatut {
    Available,
    Pending,
    InProgress,
    Done,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum DevisStatut {
    Pending,
    Accepted,
    Refused,
    Cancelled,
    InProgress,
    Done,
}

/// Statut de suivi côté client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TrackingStatut {
    AwaitingPickup,
    PickedUp,
    InTransit,
    Delivered,
}

/// Étape de livraison déclarée par le transporteur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EtapeLivraison {
    PickupScheduled,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
}

impl EtapeLivraison {
    pub fn label(&self) -> &'static str {
        match self {
            EtapeLivraison::PickupScheduled => "Enlèvement planifié",
            EtapeLivraison::PickedUp => "Marchandise enlevée",
            EtapeLivraison::InTransit => "En transit",
            EtapeLivraison::OutForDelivery => "En cours de livraison",
            EtapeLivraison::Delivered => "Livrée",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PaymentStatut {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum DisputeStatut {
    Open,
    InReview,
    Resolved,
    Cancelled,
}

impl DisputeStatut {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DisputeStatut::Resolved | DisputeStatut::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NotificationKind {
    NouveauDevis,
    DevisAccepte,
    DevisRefuse,
    DevisAnnule,
    AnnonceAnnulee,
    Tracking,
    Incident,
    Paiement,
    Message,
    Avis,
    Litige,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub nom: String,
    pub prenom: String,
    pub telephone: Option<String>,
    pub entreprise: Option<String>,
    pub avatar: Option<String>,
    pub role: Role,
    pub note_moyenne: f64,
    pub nombre_avis: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Annonce {
    pub id: String,
    pub client_id: String,
    pub titre: String,
    pub description: String,
    pub type_marchandise: String,
    pub ville_depart: String,
    pub adresse_depart: Option<String>,
    pub ville_arrivee: String,
    pub adresse_arrivee: Option<String>,
    pub date_depart: NaiveDate,
    pub date_arrivee_souhaitee: Option<NaiveDate>,
    pub poids_kg: f64,
    pub volume_m3: Option<f64>,
    pub budget_max: Option<f64>,
    pub statut: AnnonceStatut,
    pub devis_accepte_id: Option<String>,
    pub tracking_statut: Option<TrackingStatut>,
    pub paiement_statut: Option<PaymentStatut>,
    pub paiement_montant: Option<f64>,
    pub paiement_date: Option<DateTime<Utc>>,
    pub reception_confirmee_le: Option<DateTime<Utc>>,
    pub incident_description: Option<String>,
    pub incident_signale_le: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Annonce {
    /// Le propriétaire ne peut modifier ou supprimer qu'une annonce ouverte sans devis retenu.
    pub fn is_editable(&self) -> bool {
        self.statut == AnnonceStatut::Available && self.devis_accepte_id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AnnoncePhoto {
    pub id: String,
    pub annonce_id: String,
    pub chemin: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Devis {
    pub id: String,
    pub annonce_id: String,
    pub transporteur_id: String,
    pub montant: f64,
    pub delai_livraison: NaiveDate,
    pub date_validite: DateTime<Utc>,
    pub message: Option<String>,
    pub statut: DevisStatut,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Devis {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.date_validite <= now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEvent {
    pub id: String,
    pub annonce_id: String,
    pub etape: EtapeLivraison,
    pub statut: TrackingStatut,
    pub localisation: Option<String>,
    pub commentaire: Option<String>,
    pub auteur_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub annonce_id: String,
    pub devis_id: String,
    pub client_id: String,
    pub transporteur_id: String,
    pub montant: f64,
    pub devise: String,
    pub provider_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub statut: PaymentStatut,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub payment_id: String,
    pub numero: String,
    pub montant_ht: f64,
    pub tva_taux: f64,
    pub montant_tva: f64,
    pub montant_ttc: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub expediteur_id: String,
    pub destinataire_id: String,
    pub annonce_id: Option<String>,
    pub contenu: String,
    pub lu: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Avis {
    pub id: String,
    pub auteur_id: String,
    pub destinataire_id: String,
    pub annonce_id: String,
    pub note: i64,
    pub commentaire: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Dispute {
    pub id: String,
    pub annonce_id: String,
    pub devis_id: Option<String>,
    pub ouvert_par: String,
    pub contre: String,
    pub motif: String,
    pub description: String,
    pub statut: DisputeStatut,
    pub decision: Option<String>,
    pub decide_par: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dispute {
    pub fn involves(&self, user_id: &str) -> bool {
        self.ouvert_par == user_id || self.contre == user_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DisputeMessage {
    pub id: String,
    pub dispute_id: String,
    pub auteur_id: String,
    pub contenu: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub titre: String,
    pub message: String,
    pub annonce_id: Option<String>,
    pub devis_id: Option<String>,
    pub lu: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivityLog {
    pub id: String,
    pub user_id: String,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_users: i64,
    pub total_clients: i64,
    pub total_transporteurs: i64,
    pub total_annonces: i64,
    pub total_devis: i64,
    pub total_payments: i64,
    pub total_revenue: f64,
    pub open_disputes: i64,
}
