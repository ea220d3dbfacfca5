mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn test_accepting_a_devis_refuses_the_others() {
    let app = TestApp::new().await;
    let client = app.register("client@exemple.fr", "client").await;
    let alpha = app.register("alpha@transport.fr", "transporteur").await;
    let beta = app.register("beta@transport.fr", "transporteur").await;

    let annonce_id = app.create_annonce(&client).await;
    let devis_a = app.submit_devis(&alpha, &annonce_id, 900.0).await;
    let devis_b = app.submit_devis(&beta, &annonce_id, 1100.0).await;

    // Un transporteur ne propose qu'un devis par annonce
    let (status, _) = app
        .post(
            "/api/devis",
            &alpha.token,
            json!({ "annonceId": annonce_id, "montant": 850.0, "delaiLivraison": "2099-01-01" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Seul le propriétaire voit la liste des devis
    let (status, _) = app
        .get(&format!("/api/devis/annonce/{}", annonce_id), &beta.token)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app
        .get(&format!("/api/devis/annonce/{}", annonce_id), &client.token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) = app
        .post(&format!("/api/devis/{}/accept", devis_a), &client.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["devis"]["statut"], "accepted");
    assert_eq!(body["data"]["annonce"]["statut"], "available");
    assert_eq!(body["data"]["annonce"]["devisAccepteId"], devis_a.as_str());
    assert_eq!(body["data"]["annonce"]["trackingStatut"], "awaiting_pickup");
    assert_eq!(body["data"]["devisRefuses"], json!([devis_b.clone()]));

    let (_, body) = app.get(&format!("/api/devis/{}", devis_b), &beta.token).await;
    assert_eq!(body["data"]["statut"], "refused");

    // Une seule acceptation par annonce
    let (status, _) = app
        .post(&format!("/api/devis/{}/accept", devis_b), &client.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.get("/api/notifications", &beta.token).await;
    let kinds: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|n| n["kind"].as_str())
        .collect();
    assert!(kinds.contains(&"devis_refuse"), "{:?}", kinds);
}

#[tokio::test]
async fn test_only_the_owner_accepts() {
    let app = TestApp::new().await;
    let client = app.register("client@exemple.fr", "client").await;
    let other = app.register("autre@exemple.fr", "client").await;
    let alpha = app.register("alpha@transport.fr", "transporteur").await;

    let annonce_id = app.create_annonce(&client).await;
    let devis_a = app.submit_devis(&alpha, &annonce_id, 900.0).await;

    let (status, _) = app
        .post(&format!("/api/devis/{}/accept", devis_a), &other.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Un client ne soumet pas de devis
    let (status, _) = app
        .post(
            "/api/devis",
            &other.token,
            json!({ "annonceId": annonce_id, "montant": 500.0, "delaiLivraison": "2099-01-01" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_tracking_then_reviews() {
    let app = TestApp::new().await;
    let client = app.register("client@exemple.fr", "client").await;
    let alpha = app.register("alpha@transport.fr", "transporteur").await;
    let beta = app.register("beta@transport.fr", "transporteur").await;

    let annonce_id = app.create_annonce(&client).await;
    let devis_a = app.submit_devis(&alpha, &annonce_id, 900.0).await;
    app.submit_devis(&beta, &annonce_id, 1100.0).await;
    app.post(&format!("/api/devis/{}/accept", devis_a), &client.token, json!({}))
        .await;

    // Seul le transporteur retenu met à jour le suivi
    let (status, _) = app.track(&beta, &annonce_id, "picked_up").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Pas d'avis avant la livraison
    let (status, _) = app
        .post(
            "/api/avis",
            &client.token,
            json!({
                "annonceId": annonce_id,
                "destinataireId": alpha.id,
                "note": 5,
                "commentaire": "Livraison impeccable et ponctuelle",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.track(&alpha, &annonce_id, "picked_up").await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["annonce"]["statut"], "in_progress");
    assert_eq!(body["data"]["annonce"]["trackingStatut"], "picked_up");

    let (_, body) = app.get(&format!("/api/devis/{}", devis_a), &alpha.token).await;
    assert_eq!(body["data"]["statut"], "in_progress");

    // La réception ne se confirme qu'une fois livrée
    let (status, _) = app
        .post(&format!("/api/tracking/{}/confirm", annonce_id), &client.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.track(&alpha, &annonce_id, "delivered").await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["annonce"]["statut"], "done");
    assert_eq!(body["data"]["annonce"]["trackingStatut"], "delivered");

    // Plus aucune étape après la livraison
    let (status, _) = app.track(&alpha, &annonce_id, "in_transit").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .get(&format!("/api/tracking/{}", annonce_id), &client.token)
        .await;
    assert_eq!(status, StatusCode::OK);
    let historique = body["data"]["historique"].as_array().unwrap();
    assert_eq!(historique.len(), 2);
    assert_eq!(historique.last().unwrap()["etape"], "delivered");
    assert_eq!(body["data"]["transporteurId"], alpha.id.as_str());

    let (status, _) = app
        .get(&format!("/api/tracking/{}", annonce_id), &beta.token)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let confirm = format!("/api/tracking/{}/confirm", annonce_id);
    let (status, body) = app.post(&confirm, &client.token, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(body["data"]["receptionConfirmeeLe"].is_string());
    let (status, _) = app.post(&confirm, &client.token, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let avis = |destinataire: &str, note: i64| {
        json!({
            "annonceId": annonce_id,
            "destinataireId": destinataire,
            "note": note,
            "commentaire": "Livraison impeccable et ponctuelle",
        })
    };

    let (status, body) = app.post("/api/avis", &client.token, avis(&alpha.id, 5)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let (status, _) = app.post("/api/avis", &alpha.token, avis(&client.id, 4)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app.post("/api/avis", &client.token, avis(&alpha.id, 3)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.post("/api/avis", &beta.token, avis(&client.id, 1)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.post("/api/avis", &client.token, avis(&alpha.id, 9)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(
            axum::http::Method::GET,
            &format!("/api/avis/user/{}", alpha.id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resume"]["nombreAvis"], 1);
    assert_eq!(body["resume"]["noteMoyenne"], 5.0);
    assert_eq!(body["avis"]["total"], 1);
}

#[tokio::test]
async fn test_incident_and_dispute() {
    let app = TestApp::new().await;
    let client = app.register("client@exemple.fr", "client").await;
    let alpha = app.register("alpha@transport.fr", "transporteur").await;
    let admin = app.admin().await;

    let annonce_id = app.create_annonce(&client).await;
    let devis_a = app.submit_devis(&alpha, &annonce_id, 900.0).await;
    app.post(&format!("/api/devis/{}/accept", devis_a), &client.token, json!({}))
        .await;

    let issue = format!("/api/tracking/{}/issue", annonce_id);
    let description = json!({ "description": "Deux palettes arrivées endommagées" });
    let (status, _) = app.post(&issue, &client.token, description.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.track(&alpha, &annonce_id, "picked_up").await;
    let (status, body) = app.post(&issue, &client.token, description).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(body["data"]["incidentSignaleLe"].is_string());

    let litige = json!({
        "annonceId": annonce_id,
        "motif": "Marchandise endommagée",
        "description": "Deux palettes sur quatre sont arrivées écrasées.",
    });
    let (status, body) = app.post("/api/disputes", &client.token, litige.clone()).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["contre"], alpha.id.as_str());
    let dispute_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app.post("/api/disputes", &alpha.token, litige).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            &format!("/api/disputes/{}/messages", dispute_id),
            &alpha.token,
            json!({ "contenu": "Les palettes étaient mal filmées au départ." }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .put(&format!("/api/admin/disputes/{}/review", dispute_id), &client.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app
        .put(&format!("/api/admin/disputes/{}/review", dispute_id), &admin.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["statut"], "in_review");

    let (status, body) = app
        .put(
            &format!("/api/admin/disputes/{}/resolve", dispute_id),
            &admin.token,
            json!({ "decision": "Remboursement partiel de 200 euros" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["statut"], "resolved");

    let (status, _) = app
        .post(
            &format!("/api/disputes/{}/messages", dispute_id),
            &client.token,
            json!({ "contenu": "Merci." }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .get(&format!("/api/disputes/{}", dispute_id), &client.token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_refuse_and_edit_devis() {
    let app = TestApp::new().await;
    let client = app.register("client@exemple.fr", "client").await;
    let alpha = app.register("alpha@transport.fr", "transporteur").await;
    let beta = app.register("beta@transport.fr", "transporteur").await;
    let annonce_id = app.create_annonce(&client).await;
    let devis_a = app.submit_devis(&alpha, &annonce_id, 900.0).await;
    let devis_b = app.submit_devis(&beta, &annonce_id, 1100.0).await;

    // Seul le propriétaire de l'annonce refuse
    let refuse_uri = format!("/api/devis/{}/refuse", devis_b);
    let (status, _) = app.post(&refuse_uri, &alpha.token, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app.post(&refuse_uri, &client.token, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["statut"], "refused");
    let (status, _) = app.post(&refuse_uri, &client.token, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // L'auteur modifie son devis tant qu'il est en attente
    let edit_uri = format!("/api/devis/{}", devis_a);
    let terms = json!({
        "montant": 850.0,
        "delaiLivraison": (Utc::now() + Duration::days(8)).date_naive(),
        "message": "Hayon élévateur inclus",
    });
    let (status, _) = app.put(&edit_uri, &beta.token, terms.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app
        .put(&edit_uri, &alpha.token, json!({ "montant": -5.0, "delaiLivraison": "2099-01-01" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    let (status, body) = app.put(&edit_uri, &alpha.token, terms.clone()).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["montant"], 850.0);
    assert_eq!(body["data"]["message"], "Hayon élévateur inclus");

    let (status, _) = app
        .post(&format!("/api/devis/{}/accept", devis_a), &client.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.put(&edit_uri, &alpha.token, terms).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .put(
            &format!("/api/devis/{}", devis_b),
            &beta.token,
            json!({ "montant": 700.0, "delaiLivraison": "2099-01-01" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancelling_the_accepted_devis_reopens_the_annonce() {
    let app = TestApp::new().await;
    let client = app.register("client@exemple.fr", "client").await;
    let alpha = app.register("alpha@transport.fr", "transporteur").await;
    let beta = app.register("beta@transport.fr", "transporteur").await;
    let annonce_id = app.create_annonce(&client).await;
    let devis_a = app.submit_devis(&alpha, &annonce_id, 900.0).await;

    let cancel_uri = format!("/api/devis/{}/cancel", devis_a);
    let (status, _) = app.post(&cancel_uri, &client.token, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.post(&format!("/api/devis/{}/accept", devis_a), &client.token, json!({}))
        .await;
    let (status, body) = app.post(&cancel_uri, &alpha.token, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["statut"], "cancelled");
    let (status, _) = app.post(&cancel_uri, &alpha.token, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.get(&format!("/api/annonces/{}", annonce_id), &client.token).await;
    assert_eq!(body["data"]["statut"], "available");
    assert!(body["data"]["devisAccepteId"].is_null());
    assert!(body["data"]["trackingStatut"].is_null());

    let (_, body) = app.get("/api/notifications", &client.token).await;
    let kinds: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|n| n["kind"].as_str())
        .collect();
    assert!(kinds.contains(&"devis_annule"), "{:?}", kinds);

    // L'annonce rouverte accepte un nouveau devis
    let devis_b = app.submit_devis(&beta, &annonce_id, 1000.0).await;
    let (status, body) = app
        .post(&format!("/api/devis/{}/accept", devis_b), &client.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["annonce"]["devisAccepteId"], devis_b.as_str());
}

#[tokio::test]
async fn test_expired_devis_cannot_be_accepted() {
    let app = TestApp::new().await;
    let client = app.register("client@exemple.fr", "client").await;
    let alpha = app.register("alpha@transport.fr", "transporteur").await;
    let annonce_id = app.create_annonce(&client).await;
    let devis_id = app.submit_devis(&alpha, &annonce_id, 900.0).await;

    sqlx::query("UPDATE devis SET date_validite = $1 WHERE id = $2")
        .bind(Utc::now() - Duration::days(1))
        .bind(&devis_id)
        .execute(&app.state.db_pool)
        .await
        .unwrap();

    let (status, body) = app
        .post(&format!("/api/devis/{}/accept", devis_id), &client.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    let (_, body) = app.get(&format!("/api/devis/{}", devis_id), &alpha.token).await;
    assert_eq!(body["data"]["statut"], "pending");
    let (_, body) = app.get(&format!("/api/annonces/{}", annonce_id), &client.token).await;
    assert!(body["data"]["devisAccepteId"].is_null());
}
