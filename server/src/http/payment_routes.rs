use crate::auth::Claims;
use crate::db::models::{Annonce, Invoice, NotificationKind, Payment, PaymentStatut};
use crate::db::payments::{self, NewPayment};
use crate::db::{annonces, logs, users, DbPool};
use crate::http::shipment::{self, ensure_owner, find_annonce};
use crate::http::validation::parse_id;
use crate::http::{ApiError, AppState, PageParams, Paginated};
use crate::services::invoice::to_minor_units;
use crate::services::payment_gateway::{verify_webhook_signature, WebhookEvent};
use crate::services::{notify, IntentStatus, InvoiceDocument, Notice, VatBreakdown};
use crate::workflow::{self, ShipmentEvent, ShipmentState, TransitionError};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRequest {
    #[serde(alias = "annonce_id")]
    pub annonce_id: String,
}

async fn find_payment(pool: &DbPool, raw_id: &str) -> Result<Payment, ApiError> {
    let id = parse_id(raw_id)?;
    payments::get_payment_by_id(pool, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Paiement"))
}

/// Payeur, bénéficiaire ou administrateur.
fn ensure_payment_party(payment: &Payment, claims: &Claims) -> Result<(), ApiError> {
    if payment.client_id == claims.sub || payment.transporteur_id == claims.sub || claims.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Accès refusé à ce paiement".to_string()))
    }
}

/// Le secret client n'est visible que du payeur.
fn redact(mut payment: Payment, claims: &Claims) -> Payment {
    if payment.client_id != claims.sub {
        payment.client_secret = None;
    }
    payment
}

/// Le paiement porte sur le devis actuellement retenu pour l'annonce.
fn pays_retained_devis(annonce: &Annonce, payment: &Payment) -> bool {
    annonce.devis_accepte_id.as_deref() == Some(payment.devis_id.as_str())
}

/// Paiement d'un devis qui n'est plus retenu: passé en `failed` sans toucher à l'annonce.
async fn discard_stale(state: &AppState, payment: &Payment) -> Result<bool, ApiError> {
    let mut conn = state.db_pool.acquire().await?;
    let discarded = payments::transition_statut(
        &mut *conn,
        &payment.id,
        PaymentStatut::Pending,
        PaymentStatut::Failed,
    )
    .await?;
    if discarded {
        tracing::warn!(
            "⚠️ Paiement {} écarté: le devis {} n'est plus retenu",
            payment.id,
            payment.devis_id
        );
    }
    Ok(discarded)
}

pub async fn create_intent_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<IntentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let annonce = find_annonce(&state.db_pool, &req.annonce_id).await?;
    ensure_owner(&annonce, &claims)?;

    let accepted = shipment::accepted_devis(&state.db_pool, &annonce)
        .await?
        .ok_or(TransitionError::NoAcceptedQuote)?;
    workflow::apply(
        &ShipmentState::of(&annonce, Some(accepted.statut)),
        ShipmentEvent::PaymentSucceeded,
    )?;
    if payments::find_succeeded_for_annonce(&state.db_pool, &annonce.id)
        .await?
        .is_some()
    {
        return Err(TransitionError::AlreadyPaid.into());
    }

    // Une seule intention ouverte par devis
    if let Some(existing) = payments::find_pending_for_devis(&state.db_pool, &accepted.id).await? {
        tracing::debug!("💳 Intention {} réutilisée pour le devis {}", existing.provider_ref, accepted.id);
        return Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "data": {
                    "clientSecret": existing.client_secret,
                    "payment": existing,
                },
            })),
        ));
    }

    let amount = to_minor_units(accepted.montant)
        .filter(|a| *a > 0)
        .ok_or_else(|| ApiError::BadRequest("Montant du devis invalide".to_string()))?;
    let currency = state.config.payment_currency.as_str();
    let intent = state
        .gateway
        .create_intent(
            amount,
            currency,
            &[("annonce_id", annonce.id.as_str()), ("devis_id", accepted.id.as_str())],
        )
        .await?;

    let payment = payments::create_payment(
        &state.db_pool,
        NewPayment {
            annonce_id: &annonce.id,
            devis_id: &accepted.id,
            client_id: &claims.sub,
            transporteur_id: &accepted.transporteur_id,
            montant: accepted.montant,
            devise: currency,
            provider_ref: &intent.id,
            client_secret: intent.client_secret.as_deref(),
        },
    )
    .await?;

    tracing::info!(
        "💳 Intention de paiement {} via {} ({} centimes)",
        intent.id,
        state.gateway.name(),
        amount
    );
    logs::record(&state.db_pool, &claims.sub, "payment_intent_created", "payment", &payment.id, None)
        .await;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "data": {
                "clientSecret": intent.client_secret,
                "payment": payment,
            },
        })),
    ))
}

/// Passe le paiement en `succeeded` une seule fois, émet la facture et
/// applique `PaymentSucceeded` à l'annonce. `None` si le paiement était déjà traité.
async fn finalize_success(state: &AppState, payment: &Payment) -> Result<Option<Invoice>, ApiError> {
    let now = Utc::now();
    let vat = VatBreakdown::from_ttc(payment.montant, state.config.tva_rate).ok_or_else(|| {
        ApiError::Internal(format!("Ventilation TVA impossible pour {}", payment.montant))
    })?;

    let mut tx = state.db_pool.begin().await?;
    if !payments::transition_statut(
        &mut *tx,
        &payment.id,
        PaymentStatut::Pending,
        PaymentStatut::Succeeded,
    )
    .await?
    {
        return Ok(None);
    }

    let annonce = shipment::find_annonce_in(&mut *tx, &payment.annonce_id).await?;
    if !pays_retained_devis(&annonce, payment) {
        return Err(TransitionError::StalePayment.into());
    }
    let current = shipment::load_state(&mut *tx, &annonce).await?;
    let transition = workflow::apply(&current, ShipmentEvent::PaymentSucceeded)?;

    let invoice = payments::create_invoice(&mut *tx, &payment.id, &vat.to_amounts(), now).await?;
    annonces::set_payment_summary(
        &mut *tx,
        &annonce.id,
        PaymentStatut::Succeeded,
        payment.montant,
        Some(now),
    )
    .await?;
    shipment::persist(&mut *tx, &annonce, &transition, annonce.devis_accepte_id.as_deref()).await?;
    tx.commit().await?;

    tracing::info!("✅ Paiement {} confirmé, facture {}", payment.id, invoice.numero);

    notify(
        &state.db_pool,
        Notice::new(
            &payment.transporteur_id,
            NotificationKind::Paiement,
            "Paiement reçu",
            format!(
                "Le paiement de {:.2} {} pour « {} » a été effectué.",
                payment.montant, payment.devise, annonce.titre
            ),
        )
        .annonce(&annonce.id)
        .devis(&payment.devis_id),
    )
    .await;
    match users::get_user_by_id(&state.db_pool, &payment.client_id).await {
        Ok(Some(client)) => {
            state
                .email
                .send_payment_receipt(&client.email, &invoice.numero, invoice.montant_ttc)
                .await
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("⚠️ Client introuvable pour le reçu: {}", e),
    }
    logs::record(
        &state.db_pool,
        &payment.client_id,
        "payment_succeeded",
        "payment",
        &payment.id,
        Some(serde_json::json!({ "facture": invoice.numero })),
    )
    .await;

    Ok(Some(invoice))
}

async fn mark_failed(state: &AppState, payment: &Payment) -> Result<bool, ApiError> {
    let mut tx = state.db_pool.begin().await?;
    let failed = payments::transition_statut(
        &mut *tx,
        &payment.id,
        PaymentStatut::Pending,
        PaymentStatut::Failed,
    )
    .await?;
    if failed {
        annonces::set_payment_summary(
            &mut *tx,
            &payment.annonce_id,
            PaymentStatut::Failed,
            payment.montant,
            None,
        )
        .await?;
    }
    tx.commit().await?;

    if failed {
        tracing::warn!("❌ Paiement {} refusé", payment.id);
    }
    Ok(failed)
}

pub async fn confirm_payment_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let payment = find_payment(&state.db_pool, &id).await?;
    if payment.client_id != claims.sub {
        return Err(ApiError::Forbidden(
            "Seul le payeur peut confirmer ce paiement".to_string(),
        ));
    }
    match payment.statut {
        PaymentStatut::Pending => {}
        PaymentStatut::Succeeded => return Err(TransitionError::AlreadyPaid.into()),
        other => {
            return Err(ApiError::BadRequest(format!(
                "Paiement non confirmable (statut {:?})",
                other
            )))
        }
    }

    let annonce = find_annonce(&state.db_pool, &payment.annonce_id).await?;
    if !pays_retained_devis(&annonce, &payment) {
        discard_stale(&state, &payment).await?;
        return Err(TransitionError::StalePayment.into());
    }

    let intent = state.gateway.retrieve_intent(&payment.provider_ref).await?;
    if Some(intent.amount) != to_minor_units(payment.montant) {
        tracing::error!(
            "❌ Montant incohérent pour {}: {:.2} attendu, {} centimes reçus",
            payment.id,
            payment.montant,
            intent.amount
        );
        return Err(ApiError::BadRequest("Montant du paiement incohérent".to_string()));
    }

    match intent.status {
        IntentStatus::Succeeded => {
            let invoice = match finalize_success(&state, &payment).await? {
                Some(invoice) => Some(invoice),
                // Déjà traité par le webhook
                None => payments::get_invoice_by_payment(&state.db_pool, &payment.id).await?,
            };
            let payment = find_payment(&state.db_pool, &payment.id).await?;
            Ok(Json(serde_json::json!({
                "success": true,
                "message": "Paiement confirmé",
                "data": { "payment": payment, "facture": invoice },
            })))
        }
        IntentStatus::Failed | IntentStatus::Canceled => {
            mark_failed(&state, &payment).await?;
            Err(ApiError::BadRequest(
                intent
                    .failure_message
                    .unwrap_or_else(|| "Le paiement a été refusé".to_string()),
            ))
        }
        IntentStatus::Pending | IntentStatus::Processing => Ok(Json(serde_json::json!({
            "success": true,
            "message": "Paiement en cours de traitement",
            "data": { "payment": payment },
        }))),
    }
}

pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let secret = state
        .config
        .stripe_webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("Webhook de paiement non configuré".to_string()))?;
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("En-tête Stripe-Signature manquant".to_string()))?;

    verify_webhook_signature(&body, signature, secret, Utc::now().timestamp()).map_err(|e| {
        tracing::warn!("⚠️ Webhook rejeté: {}", e);
        ApiError::BadRequest(format!("Webhook rejeté: {}", e))
    })?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Événement invalide: {}", e)))?;
    tracing::debug!("🔔 Webhook {} ({})", event.kind, event.data.object.id);

    let handled = match event.kind.as_str() {
        "payment_intent.succeeded" | "payment_intent.payment_failed" => {
            match payments::get_payment_by_provider_ref(&state.db_pool, &event.data.object.id).await? {
                Some(payment) if payment.statut == PaymentStatut::Pending => {
                    let annonce = find_annonce(&state.db_pool, &payment.annonce_id).await?;
                    if !pays_retained_devis(&annonce, &payment) {
                        discard_stale(&state, &payment).await?
                    } else if event.kind == "payment_intent.succeeded" {
                        finalize_success(&state, &payment).await?.is_some()
                    } else {
                        mark_failed(&state, &payment).await?
                    }
                }
                Some(_) => false,
                None => {
                    tracing::warn!("⚠️ Webhook pour un paiement inconnu: {}", event.data.object.id);
                    false
                }
            }
        }
        _ => false,
    };

    Ok(Json(serde_json::json!({ "received": true, "handled": handled })))
}

pub async fn my_payments_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let items: Vec<Payment> = payments::list_for_user(&state.db_pool, &claims.sub, params.limit(), params.offset())
        .await?
        .into_iter()
        .map(|p| redact(p, &claims))
        .collect();
    let total = payments::count_for_user(&state.db_pool, &claims.sub).await?;

    Ok(Json(Paginated::new(items, total, &params)))
}

pub async fn get_payment_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let payment = find_payment(&state.db_pool, &id).await?;
    ensure_payment_party(&payment, &claims)?;
    let invoice = payments::get_invoice_by_payment(&state.db_pool, &payment.id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": { "payment": redact(payment, &claims), "facture": invoice },
    })))
}

pub async fn invoice_pdf_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let payment = find_payment(&state.db_pool, &id).await?;
    ensure_payment_party(&payment, &claims)?;
    let invoice = payments::get_invoice_by_payment(&state.db_pool, &payment.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Facture"))?;

    let annonce = find_annonce(&state.db_pool, &payment.annonce_id).await?;
    let client = users::get_user_by_id(&state.db_pool, &payment.client_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Client"))?;
    let transporteur = users::get_user_by_id(&state.db_pool, &payment.transporteur_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Transporteur"))?;

    let document = InvoiceDocument {
        numero: invoice.numero.clone(),
        date: invoice.created_at,
        client: format!("{} {}", client.prenom, client.nom),
        client_email: client.email,
        transporteur: transporteur
            .entreprise
            .unwrap_or_else(|| format!("{} {}", transporteur.prenom, transporteur.nom)),
        annonce_titre: annonce.titre,
        trajet: format!("{} → {}", annonce.ville_depart, annonce.ville_arrivee),
        devise: payment.devise,
        montant_ht: invoice.montant_ht,
        tva_taux: invoice.tva_taux,
        montant_tva: invoice.montant_tva,
        montant_ttc: invoice.montant_ttc,
    };
    let pdf = state.pdf.render_invoice(&document)?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.pdf\"", invoice.numero),
            ),
        ],
        pdf,
    ))
}
