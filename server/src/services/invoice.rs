use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::db::payments::InvoiceAmounts;

/// Ventilation TVA d'un montant TTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VatBreakdown {
    pub montant_ht: Decimal,
    pub tva_taux: Decimal,
    pub montant_tva: Decimal,
    pub montant_ttc: Decimal,
}

impl VatBreakdown {
    /// Le montant payé est TTC; HT arrondi au centime, la TVA absorbe l'arrondi.
    pub fn from_ttc(montant_ttc: f64, tva_taux: f64) -> Option<Self> {
        let ttc = round_cents(Decimal::from_f64(montant_ttc)?);
        let taux = Decimal::from_f64(tva_taux)?.round_dp(4);
        if ttc.is_sign_negative() || taux.is_sign_negative() {
            return None;
        }

        let ht = round_cents(ttc / (Decimal::ONE + taux));
        Some(Self {
            montant_ht: ht,
            tva_taux: taux,
            montant_tva: ttc - ht,
            montant_ttc: ttc,
        })
    }

    pub fn to_amounts(&self) -> InvoiceAmounts {
        InvoiceAmounts {
            montant_ht: self.montant_ht.to_f64().unwrap_or_default(),
            tva_taux: self.tva_taux.to_f64().unwrap_or_default(),
            montant_tva: self.montant_tva.to_f64().unwrap_or_default(),
            montant_ttc: self.montant_ttc.to_f64().unwrap_or_default(),
        }
    }
}

fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Montant en centimes pour la passerelle de paiement.
pub fn to_minor_units(montant: f64) -> Option<i64> {
    let value = round_cents(Decimal::from_f64(montant)?);
    (value * Decimal::ONE_HUNDRED).to_i64()
}
