use crate::db::models::{Invoice, Payment, PaymentStatut};
use crate::db::{new_id, DbPool};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

pub struct NewPayment<'a> {
    pub annonce_id: &'a str,
    pub devis_id: &'a str,
    pub client_id: &'a str,
    pub transporteur_id: &'a str,
    pub montant: f64,
    pub devise: &'a str,
    pub provider_ref: &'a str,
    pub client_secret: Option<&'a str>,
}

pub async fn create_payment(pool: &DbPool, new: NewPayment<'_>) -> Result<Payment, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments
        (id, annonce_id, devis_id, client_id, transporteur_id, montant, devise, provider_ref,
         client_secret, statut, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', $10, $10)
        RETURNING *
        "#,
    )
    .bind(new_id())
    .bind(new.annonce_id)
    .bind(new.devis_id)
    .bind(new.client_id)
    .bind(new.transporteur_id)
    .bind(new.montant)
    .bind(new.devise)
    .bind(new.provider_ref)
    .bind(new.client_secret)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub async fn get_payment_by_id(pool: &DbPool, id: &str) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn get_payment_by_provider_ref(
    pool: &DbPool,
    provider_ref: &str,
) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE provider_ref = $1")
        .bind(provider_ref)
        .fetch_optional(pool)
        .await
}

pub async fn find_succeeded_for_annonce(
    pool: &DbPool,
    annonce_id: &str,
) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE annonce_id = $1 AND statut = 'succeeded' LIMIT 1",
    )
    .bind(annonce_id)
    .fetch_optional(pool)
    .await
}

/// Intention encore ouverte pour ce devis, réutilisée au lieu d'en créer une autre.
pub async fn find_pending_for_devis(
    pool: &DbPool,
    devis_id: &str,
) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE devis_id = $1 AND statut = 'pending' ORDER BY created_at DESC LIMIT 1",
    )
    .bind(devis_id)
    .fetch_optional(pool)
    .await
}

/// Le devis n'est plus retenu: ses paiements en attente ne pourront plus aboutir.
pub async fn fail_pending_for_devis(
    conn: &mut SqliteConnection,
    devis_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE payments SET statut = 'failed', updated_at = $1 WHERE devis_id = $2 AND statut = 'pending'",
    )
    .bind(Utc::now())
    .bind(devis_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Passe le paiement de `expected` à `statut`; faux si un autre appel l'a déjà fait.
pub async fn transition_statut(
    conn: &mut SqliteConnection,
    id: &str,
    expected: PaymentStatut,
    statut: PaymentStatut,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE payments SET statut = $1, updated_at = $2 WHERE id = $3 AND statut = $4",
    )
    .bind(statut)
    .bind(Utc::now())
    .bind(id)
    .bind(expected)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn list_for_user(
    pool: &DbPool,
    user_id: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>(
        r#"
        SELECT * FROM payments
        WHERE client_id = $1 OR transporteur_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count_for_user(pool: &DbPool, user_id: &str) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) as count FROM payments WHERE client_id = $1 OR transporteur_id = $1",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(row.get("count"))
}

pub struct InvoiceAmounts {
    pub montant_ht: f64,
    pub tva_taux: f64,
    pub montant_tva: f64,
    pub montant_ttc: f64,
}

/// Numérote la facture `FAC-YYYYMM-NNNN`, séquence remise à zéro chaque mois.
pub async fn create_invoice(
    conn: &mut SqliteConnection,
    payment_id: &str,
    amounts: &InvoiceAmounts,
    now: DateTime<Utc>,
) -> Result<Invoice, sqlx::Error> {
    let prefix = format!("FAC-{}-", now.format("%Y%m"));
    let row = sqlx::query("SELECT COUNT(*) as count FROM invoices WHERE numero LIKE $1")
        .bind(format!("{}%", prefix))
        .fetch_one(&mut *conn)
        .await?;
    let count: i64 = row.get("count");
    let numero = format!("{}{:04}", prefix, count + 1);

    sqlx::query_as::<_, Invoice>(
        r#"
        INSERT INTO invoices
        (id, payment_id, numero, montant_ht, tva_taux, montant_tva, montant_ttc, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(new_id())
    .bind(payment_id)
    .bind(numero)
    .bind(amounts.montant_ht)
    .bind(amounts.tva_taux)
    .bind(amounts.montant_tva)
    .bind(amounts.montant_ttc)
    .bind(now)
    .fetch_one(conn)
    .await
}

pub async fn get_invoice_by_payment(
    pool: &DbPool,
    payment_id: &str,
) -> Result<Option<Invoice>, sqlx::Error> {
    sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE payment_id = $1")
        .bind(payment_id)
        .fetch_optional(pool)
        .await
}

pub async fn total_spent_by_client(pool: &DbPool, client_id: &str) -> Result<f64, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COALESCE(SUM(montant), 0.0) as total FROM payments WHERE client_id = $1 AND statut = 'succeeded'",
    )
    .bind(client_id)
    .fetch_one(pool)
    .await?;
    Ok(row.get("total"))
}

pub async fn revenue_for_transporteur(
    pool: &DbPool,
    transporteur_id: &str,
) -> Result<f64, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COALESCE(SUM(montant), 0.0) as total FROM payments WHERE transporteur_id = $1 AND statut = 'succeeded'",
    )
    .bind(transporteur_id)
    .fetch_one(pool)
    .await?;
    Ok(row.get("total"))
}

pub async fn monthly_revenue_for_transporteur(
    pool: &DbPool,
    transporteur_id: &str,
) -> Result<Vec<(String, f64)>, sqlx::Error> {
    sqlx::query_as::<_, (String, f64)>(
        r#"
        SELECT substr(updated_at, 1, 7) as mois, SUM(montant)
        FROM payments
        WHERE transporteur_id = $1 AND statut = 'succeeded'
        GROUP BY mois ORDER BY mois DESC LIMIT 12
        "#,
    )
    .bind(transporteur_id)
    .fetch_all(pool)
    .await
}

/// (nombre de paiements réussis, volume total)
pub async fn succeeded_volume(pool: &DbPool) -> Result<(i64, f64), sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) as total, COALESCE(SUM(montant), 0.0) as volume FROM payments WHERE statut = 'succeeded'",
    )
    .fetch_one(pool)
    .await?;
    Ok((row.get("total"), row.get("volume")))
}
