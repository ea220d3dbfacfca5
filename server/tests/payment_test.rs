mod common;

use axum::body::Body;
use axum::http::{header, Method, StatusCode};
use chrono::Utc;
use common::{TestApp, TestUser};
use protrans_server::services::payment_gateway::sign_webhook;
use serde_json::json;

/// Annonce avec un devis accepté, prête à être payée.
async fn accepted_annonce(app: &TestApp) -> (TestUser, TestUser, String) {
    let client = app.register("client@exemple.fr", "client").await;
    let transporteur = app.register("alpha@transport.fr", "transporteur").await;
    let annonce_id = app.create_annonce(&client).await;
    let devis_id = app.submit_devis(&transporteur, &annonce_id, 1200.0).await;
    let (status, _) = app
        .post(&format!("/api/devis/{}/accept", devis_id), &client.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    (client, transporteur, annonce_id)
}

async fn create_intent(app: &TestApp, client: &TestUser, annonce_id: &str) -> String {
    let (status, body) = app
        .post("/api/payments/intent", &client.token, json!({ "annonceId": annonce_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert!(body["data"]["clientSecret"].is_string());
    assert_eq!(body["data"]["payment"]["statut"], "pending");
    body["data"]["payment"]["id"].as_str().unwrap().to_string()
}

async fn post_webhook(app: &TestApp, payload: &str, signature: &str) -> (StatusCode, serde_json::Value) {
    let (status, _, bytes) = app
        .raw(
            Method::POST,
            "/api/payments/webhook",
            None,
            &[("content-type", "application/json"), ("stripe-signature", signature)],
            Body::from(payload.to_string()),
        )
        .await;
    (status, serde_json::from_slice(&bytes).unwrap_or_default())
}

#[tokio::test]
async fn test_confirm_issues_invoice() {
    let app = TestApp::new().await;
    let (client, transporteur, annonce_id) = accepted_annonce(&app).await;

    // Le transporteur ne paie pas à la place du client
    let (status, _) = app
        .post("/api/payments/intent", &transporteur.token, json!({ "annonceId": annonce_id }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let payment_id = create_intent(&app, &client, &annonce_id).await;

    let (status, body) = app
        .post(&format!("/api/payments/{}/confirm", payment_id), &client.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["payment"]["statut"], "succeeded");
    let facture = &body["data"]["facture"];
    assert!(facture["numero"].as_str().unwrap().starts_with("FAC-"));
    assert_eq!(facture["montantTtc"], 1200.0);
    assert_eq!(facture["montantHt"], 1000.0);
    assert_eq!(facture["montantTva"], 200.0);

    let (_, body) = app
        .call(Method::GET, &format!("/api/annonces/{}", annonce_id), None, None)
        .await;
    assert_eq!(body["data"]["statut"], "pending");
    assert_eq!(body["data"]["paiementStatut"], "succeeded");
    assert_eq!(body["data"]["paiementMontant"], 1200.0);

    // Une annonce n'est payée qu'une fois, et ne s'annule plus
    let (status, _) = app
        .post("/api/payments/intent", &client.token, json!({ "annonceId": annonce_id }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .post(&format!("/api/payments/{}/confirm", payment_id), &client.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .post(&format!("/api/annonces/{}/cancel", annonce_id), &client.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Le transporteur voit le paiement, sans le secret client
    let (status, body) = app
        .get(&format!("/api/payments/{}", payment_id), &transporteur.token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["payment"].get("clientSecret").is_none());
    assert!(body["data"]["facture"]["numero"].is_string());

    let (_, body) = app.get("/api/payments/mine", &transporteur.token).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invoice_pdf() {
    let app = TestApp::new().await;
    let (client, _, annonce_id) = accepted_annonce(&app).await;
    let payment_id = create_intent(&app, &client, &annonce_id).await;

    let invoice_uri = format!("/api/payments/{}/invoice", payment_id);
    let (status, _, _) = app
        .raw(Method::GET, &invoice_uri, Some(&client.token), &[], Body::empty())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.post(&format!("/api/payments/{}/confirm", payment_id), &client.token, json!({}))
        .await;

    let (status, headers, bytes) = app
        .raw(Method::GET, &invoice_uri, Some(&client.token), &[], Body::empty())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.contains("FAC-"), "{}", disposition);
    assert!(bytes.starts_with(b"%PDF"));

    let outsider = app.register("curieux@exemple.fr", "client").await;
    let (status, _, _) = app
        .raw(Method::GET, &invoice_uri, Some(&outsider.token), &[], Body::empty())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_webhook_settles_payment_once() {
    let app = TestApp::new().await;
    let (client, _, annonce_id) = accepted_annonce(&app).await;
    let payment_id = create_intent(&app, &client, &annonce_id).await;

    let (_, body) = app
        .get(&format!("/api/payments/{}", payment_id), &client.token)
        .await;
    let provider_ref = body["data"]["payment"]["providerRef"].as_str().unwrap().to_string();

    let payload = json!({
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": provider_ref } },
    })
    .to_string();

    let (status, _) = post_webhook(&app, &payload, "t=1,v1=deadbeef").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    for header in ["t=-9223372036854775808,v1=00", "t=9223372036854775807,v1=00"] {
        let (status, _) = post_webhook(&app, &payload, header).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
    let forged = sign_webhook(payload.as_bytes(), "whsec_autre", Utc::now().timestamp());
    let (status, _) = post_webhook(&app, &payload, &forged).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let signature = sign_webhook(payload.as_bytes(), "whsec_test", Utc::now().timestamp());
    let (status, body) = post_webhook(&app, &payload, &signature).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["handled"], true);

    // Rejoué: déjà traité
    let (status, body) = post_webhook(&app, &payload, &signature).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["handled"], false);

    let (_, body) = app
        .get(&format!("/api/payments/{}", payment_id), &client.token)
        .await;
    assert_eq!(body["data"]["payment"]["statut"], "succeeded");
    assert!(body["data"]["facture"]["numero"].is_string());

    let (status, _) = app
        .post(&format!("/api/payments/{}/confirm", payment_id), &client.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_intent_requires_accepted_devis() {
    let app = TestApp::new().await;
    let client = app.register("client@exemple.fr", "client").await;
    let annonce_id = app.create_annonce(&client).await;

    let (status, _) = app
        .post("/api/payments/intent", &client.token, json!({ "annonceId": annonce_id }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_intent_is_reused_while_pending() {
    let app = TestApp::new().await;
    let (client, _, annonce_id) = accepted_annonce(&app).await;
    let payment_id = create_intent(&app, &client, &annonce_id).await;

    let (status, body) = app
        .post("/api/payments/intent", &client.token, json!({ "annonceId": annonce_id }))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["payment"]["id"], payment_id.as_str());
    assert!(body["data"]["clientSecret"].is_string());

    let (_, body) = app.get("/api/payments/mine", &client.token).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_payment_of_withdrawn_devis_is_not_credited() {
    let app = TestApp::new().await;
    let (client, alpha, annonce_id) = accepted_annonce(&app).await;
    let stale_id = create_intent(&app, &client, &annonce_id).await;

    // Le transporteur retenu se retire: l'annonce est rouverte
    let (_, body) = app
        .get(&format!("/api/payments/{}", stale_id), &client.token)
        .await;
    let alpha_devis = body["data"]["payment"]["devisId"].as_str().unwrap().to_string();
    let (status, body) = app
        .post(&format!("/api/devis/{}/cancel", alpha_devis), &alpha.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (_, body) = app
        .get(&format!("/api/payments/{}", stale_id), &client.token)
        .await;
    assert_eq!(body["data"]["payment"]["statut"], "failed");

    let beta = app.register("beta@transport.fr", "transporteur").await;
    let beta_devis = app.submit_devis(&beta, &annonce_id, 1100.0).await;
    let (status, _) = app
        .post(&format!("/api/devis/{}/accept", beta_devis), &client.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);

    // Même resté en attente, l'ancien paiement ne règle pas le nouveau devis
    sqlx::query("UPDATE payments SET statut = 'pending' WHERE id = $1")
        .bind(&stale_id)
        .execute(&app.state.db_pool)
        .await
        .unwrap();
    let (status, body) = app
        .post(&format!("/api/payments/{}/confirm", stale_id), &client.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    let (_, body) = app
        .call(Method::GET, &format!("/api/annonces/{}", annonce_id), None, None)
        .await;
    assert_eq!(body["data"]["statut"], "available");
    assert_eq!(body["data"]["devisAccepteId"], beta_devis.as_str());
    assert_ne!(body["data"]["paiementStatut"], "succeeded");

    let (_, body) = app
        .get(&format!("/api/payments/{}", stale_id), &client.token)
        .await;
    assert_eq!(body["data"]["payment"]["statut"], "failed");

    // Le webhook tardif de l'ancienne intention est écarté aussi
    sqlx::query("UPDATE payments SET statut = 'pending' WHERE id = $1")
        .bind(&stale_id)
        .execute(&app.state.db_pool)
        .await
        .unwrap();
    let provider_ref = body["data"]["payment"]["providerRef"].as_str().unwrap().to_string();
    let payload = json!({
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": provider_ref } },
    })
    .to_string();
    let signature = sign_webhook(payload.as_bytes(), "whsec_test", Utc::now().timestamp());
    let (status, _) = post_webhook(&app, &payload, &signature).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app
        .call(Method::GET, &format!("/api/annonces/{}", annonce_id), None, None)
        .await;
    assert_ne!(body["data"]["paiementStatut"], "succeeded");

    // Le devis retenu se paie normalement
    let payment_id = create_intent(&app, &client, &annonce_id).await;
    assert_ne!(payment_id, stale_id);
    let (status, body) = app
        .post(&format!("/api/payments/{}/confirm", payment_id), &client.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["facture"]["montantTtc"], 1100.0);
}
