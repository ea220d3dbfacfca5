use crate::db::models::{AdminStats, DevisStatut, Role};
use crate::db::{annonces, devis, disputes, payments, users, DbPool};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyValue {
    pub mois: String,
    pub valeur: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientAnalytics {
    pub annonces_par_statut: BTreeMap<String, i64>,
    pub total_annonces: i64,
    pub total_depense: f64,
    pub devis_recus: i64,
    pub montant_moyen_devis: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransporteurAnalytics {
    pub devis_par_statut: BTreeMap<String, i64>,
    pub total_devis: i64,
    pub taux_acceptation: f64,
    pub chiffre_affaires: f64,
    pub livraisons_terminees: i64,
    pub note_moyenne: f64,
    pub nombre_avis: i64,
    pub revenus_mensuels: Vec<MonthlyValue>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformAnalytics {
    pub utilisateurs_par_role: BTreeMap<String, i64>,
    pub annonces_par_statut: BTreeMap<String, i64>,
    pub paiements_reussis: i64,
    pub volume_paiements: f64,
    pub litiges_ouverts: i64,
    pub annonces_mensuelles: Vec<MonthlyValue>,
}

/// Compte par statut, indexé par le nom du statut tel qu'il circule en JSON.
pub fn by_statut<S: Serialize>(rows: Vec<(S, i64)>) -> BTreeMap<String, i64> {
    rows.into_iter()
        .filter_map(|(statut, n)| match serde_json::to_value(statut) {
            Ok(serde_json::Value::String(key)) => Some((key, n)),
            _ => None,
        })
        .collect()
}

/// Part des devis retenus (acceptés, en cours ou livrés) parmi ceux envoyés, en pourcentage.
pub fn acceptance_rate(per_statut: &[(DevisStatut, i64)]) -> f64 {
    let total: i64 = per_statut.iter().map(|(_, n)| n).sum();
    if total == 0 {
        return 0.0;
    }
    let won: i64 = per_statut
        .iter()
        .filter(|(s, _)| {
            matches!(s, DevisStatut::Accepted | DevisStatut::InProgress | DevisStatut::Done)
        })
        .map(|(_, n)| n)
        .sum();
    ((won as f64 / total as f64) * 1000.0).round() / 10.0
}

pub async fn client_analytics(pool: &DbPool, client_id: &str) -> Result<ClientAnalytics, sqlx::Error> {
    let per_statut = annonces::count_by_statut(pool, Some(client_id)).await?;
    let total_annonces = per_statut.iter().map(|(_, n)| n).sum();
    let total_depense = payments::total_spent_by_client(pool, client_id).await?;
    let (devis_recus, moyenne) = devis::received_summary(pool, client_id).await?;

    Ok(ClientAnalytics {
        annonces_par_statut: by_statut(per_statut),
        total_annonces,
        total_depense,
        devis_recus,
        montant_moyen_devis: (moyenne * 100.0).round() / 100.0,
    })
}

pub async fn transporteur_analytics(
    pool: &DbPool,
    transporteur_id: &str,
) -> Result<TransporteurAnalytics, sqlx::Error> {
    let per_statut = devis::count_by_statut_for_transporteur(pool, transporteur_id).await?;
    let total_devis = per_statut.iter().map(|(_, n)| n).sum();
    let taux_acceptation = acceptance_rate(&per_statut);
    let livraisons_terminees = per_statut
        .iter()
        .filter(|(s, _)| *s == DevisStatut::Done)
        .map(|(_, n)| n)
        .sum();
    let chiffre_affaires = payments::revenue_for_transporteur(pool, transporteur_id).await?;
    let revenus_mensuels = payments::monthly_revenue_for_transporteur(pool, transporteur_id)
        .await?
        .into_iter()
        .map(|(mois, valeur)| MonthlyValue { mois, valeur })
        .collect();
    let user = users::get_user_by_id(pool, transporteur_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;

    Ok(TransporteurAnalytics {
        devis_par_statut: by_statut(per_statut),
        total_devis,
        taux_acceptation,
        chiffre_affaires,
        livraisons_terminees,
        note_moyenne: user.note_moyenne,
        nombre_avis: user.nombre_avis,
        revenus_mensuels,
    })
}

pub async fn platform_analytics(pool: &DbPool) -> Result<PlatformAnalytics, sqlx::Error> {
    let roles = sqlx::query_as::<_, (Role, i64)>("SELECT role, COUNT(*) FROM users GROUP BY role")
        .fetch_all(pool)
        .await?;
    let per_statut = annonces::count_by_statut(pool, None).await?;
    let (paiements_reussis, volume_paiements) = payments::succeeded_volume(pool).await?;
    let litiges_ouverts = disputes::count_unresolved(pool).await?;
    let annonces_mensuelles = annonces::monthly_counts(pool)
        .await?
        .into_iter()
        .map(|(mois, n)| MonthlyValue { mois, valeur: n as f64 })
        .collect();

    Ok(PlatformAnalytics {
        utilisateurs_par_role: roles
            .into_iter()
            .map(|(r, n)| (r.as_str().to_string(), n))
            .collect(),
        annonces_par_statut: by_statut(per_statut),
        paiements_reussis,
        volume_paiements,
        litiges_ouverts,
        annonces_mensuelles,
    })
}

pub async fn admin_stats(pool: &DbPool) -> Result<AdminStats, sqlx::Error> {
    let (total_payments, total_revenue) = payments::succeeded_volume(pool).await?;
    let total_annonces = annonces::count_by_statut(pool, None)
        .await?
        .iter()
        .map(|(_, n)| n)
        .sum();

    Ok(AdminStats {
        total_users: users::count_users(pool).await?,
        total_clients: users::count_by_role(pool, Role::Client).await?,
        total_transporteurs: users::count_by_role(pool, Role::Transporteur).await?,
        total_annonces,
        total_devis: devis::count_devis(pool).await?,
        total_payments,
        total_revenue,
        open_disputes: disputes::count_unresolved(pool).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::AnnonceStatut;

    #[test]
    fn test_acceptance_rate() {
        assert_eq!(acceptance_rate(&[]), 0.0);
        let stats = [
            (DevisStatut::Accepted, 1),
            (DevisStatut::Done, 1),
            (DevisStatut::Refused, 1),
        ];
        assert_eq!(acceptance_rate(&stats), 66.7);
    }

    #[test]
    fn test_status_keys_match_wire_format() {
        let annonces = by_statut(vec![(AnnonceStatut::InProgress, 2)]);
        assert_eq!(annonces.get("in_progress"), Some(&2));
        let devis = by_statut(vec![(DevisStatut::Refused, 1)]);
        assert_eq!(devis.get("refused"), Some(&1));
    }
}
