//! Cycle de vie annonce / devis / suivi.
//!
//! Toutes les transitions de statut passent par [`apply`]: les routes lisent l'état
//! courant, appellent `apply`, puis persistent le résultat dans une seule transaction.
//! Une combinaison invalide renvoie une [`TransitionError`] (HTTP 400).

use crate::db::models::{
    Annonce, AnnonceStatut, DevisStatut, EtapeLivraison, PaymentStatut, TrackingStatut,
};
use thiserror::Error;

/// État d'une expédition vu depuis l'annonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShipmentState {
    pub annonce: AnnonceStatut,
    /// Statut du devis retenu, s'il y en a un.
    pub accepted_devis: Option<DevisStatut>,
    pub tracking: Option<TrackingStatut>,
    pub paid: bool,
}

impl ShipmentState {
    pub fn of(annonce: &Annonce, accepted_devis: Option<DevisStatut>) -> Self {
        Self {
            annonce: annonce.statut,
            accepted_devis,
            tracking: annonce.tracking_statut,
            paid: annonce.paiement_statut == Some(PaymentStatut::Succeeded),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShipmentEvent {
    QuoteSubmitted,
    /// `quote` est le statut actuel du devis concerné.
    QuoteAccepted { quote: DevisStatut, expired: bool },
    QuoteRefused { quote: DevisStatut },
    QuoteCancelled { quote: DevisStatut },
    PaymentSucceeded,
    TrackingUpdate(EtapeLivraison),
    ReceiptConfirmed,
    IssueReported,
    AnnonceCancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub state: ShipmentState,
    /// Nouveau statut du devis concerné par l'événement.
    pub quote: Option<DevisStatut>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("L'annonce n'est plus ouverte aux devis")]
    AnnonceNotOpen,
    #[error("Un devis a déjà été accepté pour cette annonce")]
    AlreadyAccepted,
    #[error("Ce devis a expiré")]
    QuoteExpired,
    #[error("Action impossible: le devis est au statut {0:?}")]
    InvalidQuoteState(DevisStatut),
    #[error("Aucun devis accepté pour cette annonce")]
    NoAcceptedQuote,
    #[error("La livraison est déjà terminée")]
    AlreadyDelivered,
    #[error("L'annonce a été annulée")]
    AnnonceCancelled,
    #[error("La livraison est déjà en cours")]
    ShipmentStarted,
    #[error("Le paiement a déjà été effectué")]
    AlreadyPaid,
    #[error("Ce paiement ne correspond plus au devis retenu")]
    StalePayment,
    #[error("La marchandise n'a pas encore été livrée")]
    NotDelivered,
    #[error("Le transport n'a pas encore commencé")]
    NotStarted,
}

/// Correspondance fixe étape transporteur -> statut de suivi client.
pub fn tracking_for(etape: EtapeLivraison) -> TrackingStatut {
    match etape {
        EtapeLivraison::PickupScheduled => TrackingStatut::AwaitingPickup,
        EtapeLivraison::PickedUp => TrackingStatut::PickedUp,
        EtapeLivraison::InTransit | EtapeLivraison::OutForDelivery => TrackingStatut::InTransit,
        EtapeLivraison::Delivered => TrackingStatut::Delivered,
    }
}

pub fn apply(state: &ShipmentState, event: ShipmentEvent) -> Result<Transition, TransitionError> {
    let mut next = *state;

    let quote = match event {
        ShipmentEvent::QuoteSubmitted => {
            ensure_open(state)?;
            Some(DevisStatut::Pending)
        }
        ShipmentEvent::QuoteAccepted { quote, expired } => {
            if quote != DevisStatut::Pending {
                return Err(TransitionError::InvalidQuoteState(quote));
            }
            if expired {
                return Err(TransitionError::QuoteExpired);
            }
            ensure_open(state)?;
            next.accepted_devis = Some(DevisStatut::Accepted);
            next.tracking = Some(TrackingStatut::AwaitingPickup);
            Some(DevisStatut::Accepted)
        }
        ShipmentEvent::QuoteRefused { quote } => {
            if quote != DevisStatut::Pending {
                return Err(TransitionError::InvalidQuoteState(quote));
            }
            Some(DevisStatut::Refused)
        }
        ShipmentEvent::QuoteCancelled { quote } => match quote {
            DevisStatut::Pending => Some(DevisStatut::Cancelled),
            DevisStatut::Accepted => {
                if state.paid {
                    return Err(TransitionError::AlreadyPaid);
                }
                match state.annonce {
                    AnnonceStatut::Available => {}
                    AnnonceStatut::Cancelled => return Err(TransitionError::AnnonceCancelled),
                    _ => return Err(TransitionError::ShipmentStarted),
                }
                next.accepted_devis = None;
                next.tracking = None;
                Some(DevisStatut::Cancelled)
            }
            other => return Err(TransitionError::InvalidQuoteState(other)),
        },
        ShipmentEvent::PaymentSucceeded => {
            if state.paid {
                return Err(TransitionError::AlreadyPaid);
            }
            match state.accepted_devis {
                Some(DevisStatut::Accepted | DevisStatut::InProgress | DevisStatut::Done) => {}
                _ => return Err(TransitionError::NoAcceptedQuote),
            }
            match state.annonce {
                AnnonceStatut::Available => next.annonce = AnnonceStatut::Pending,
                AnnonceStatut::Cancelled => return Err(TransitionError::AnnonceCancelled),
                _ => {}
            }
            next.paid = true;
            state.accepted_devis
        }
        ShipmentEvent::TrackingUpdate(etape) => {
            match state.accepted_devis {
                Some(DevisStatut::Accepted | DevisStatut::InProgress) => {}
                Some(DevisStatut::Done) => return Err(TransitionError::AlreadyDelivered),
                _ => return Err(TransitionError::NoAcceptedQuote),
            }
            match state.annonce {
                AnnonceStatut::Done => return Err(TransitionError::AlreadyDelivered),
                AnnonceStatut::Cancelled => return Err(TransitionError::AnnonceCancelled),
                _ => {}
            }
            let tracking = tracking_for(etape);
            let devis = if tracking == TrackingStatut::Delivered {
                next.annonce = AnnonceStatut::Done;
                DevisStatut::Done
            } else {
                next.annonce = AnnonceStatut::InProgress;
                DevisStatut::InProgress
            };
            next.tracking = Some(tracking);
            next.accepted_devis = Some(devis);
            Some(devis)
        }
        ShipmentEvent::ReceiptConfirmed => {
            if state.annonce != AnnonceStatut::Done
                || state.tracking != Some(TrackingStatut::Delivered)
            {
                return Err(TransitionError::NotDelivered);
            }
            None
        }
        ShipmentEvent::IssueReported => {
            if !matches!(state.annonce, AnnonceStatut::InProgress | AnnonceStatut::Done) {
                return Err(TransitionError::NotStarted);
            }
            None
        }
        ShipmentEvent::AnnonceCancelled => {
            if state.paid {
                return Err(TransitionError::AlreadyPaid);
            }
            match state.annonce {
                AnnonceStatut::Available | AnnonceStatut::Pending => {}
                AnnonceStatut::Cancelled => return Err(TransitionError::AnnonceCancelled),
                _ => return Err(TransitionError::ShipmentStarted),
            }
            next.annonce = AnnonceStatut::Cancelled;
            next.tracking = None;
            next.accepted_devis = state.accepted_devis.map(|_| DevisStatut::Cancelled);
            next.accepted_devis
        }
    };

    Ok(Transition { state: next, quote })
}

fn ensure_open(state: &ShipmentState) -> Result<(), TransitionError> {
    match state.annonce {
        AnnonceStatut::Available if state.accepted_devis.is_some() => {
            Err(TransitionError::AlreadyAccepted)
        }
        AnnonceStatut::Available => Ok(()),
        AnnonceStatut::Cancelled => Err(TransitionError::AnnonceCancelled),
        _ => Err(TransitionError::AnnonceNotOpen),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> ShipmentState {
        ShipmentState {
            annonce: AnnonceStatut::Available,
            accepted_devis: None,
            tracking: None,
            paid: false,
        }
    }

    fn accepted() -> ShipmentState {
        apply(
            &open(),
            ShipmentEvent::QuoteAccepted { quote: DevisStatut::Pending, expired: false },
        )
        .unwrap()
        .state
    }

    #[test]
    fn test_accept_keeps_annonce_statut() {
        let t = apply(
            &open(),
            ShipmentEvent::QuoteAccepted { quote: DevisStatut::Pending, expired: false },
        )
        .unwrap();

        assert_eq!(t.quote, Some(DevisStatut::Accepted));
        assert_eq!(t.state.annonce, AnnonceStatut::Available);
        assert_eq!(t.state.accepted_devis, Some(DevisStatut::Accepted));
        assert_eq!(t.state.tracking, Some(TrackingStatut::AwaitingPickup));
    }

    #[test]
    fn test_accept_twice_is_rejected() {
        let state = accepted();
        let err = apply(
            &state,
            ShipmentEvent::QuoteAccepted { quote: DevisStatut::Accepted, expired: false },
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::InvalidQuoteState(DevisStatut::Accepted));

        // Un autre devis encore "pending" ne peut pas non plus être accepté
        let err = apply(
            &state,
            ShipmentEvent::QuoteAccepted { quote: DevisStatut::Pending, expired: false },
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::AlreadyAccepted);
    }

    #[test]
    fn test_accept_expired_quote() {
        let err = apply(
            &open(),
            ShipmentEvent::QuoteAccepted { quote: DevisStatut::Pending, expired: true },
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::QuoteExpired);
    }

    #[test]
    fn test_submit_requires_open_annonce() {
        assert!(apply(&open(), ShipmentEvent::QuoteSubmitted).is_ok());
        assert_eq!(
            apply(&accepted(), ShipmentEvent::QuoteSubmitted).unwrap_err(),
            TransitionError::AlreadyAccepted
        );

        let cancelled = ShipmentState { annonce: AnnonceStatut::Cancelled, ..open() };
        assert_eq!(
            apply(&cancelled, ShipmentEvent::QuoteSubmitted).unwrap_err(),
            TransitionError::AnnonceCancelled
        );
    }

    #[test]
    fn test_tracking_moves_to_in_progress_then_done() {
        let t = apply(&accepted(), ShipmentEvent::TrackingUpdate(EtapeLivraison::PickedUp)).unwrap();
        assert_eq!(t.state.annonce, AnnonceStatut::InProgress);
        assert_eq!(t.state.tracking, Some(TrackingStatut::PickedUp));
        assert_eq!(t.quote, Some(DevisStatut::InProgress));

        // Rejouer la même étape est accepté
        let again = apply(&t.state, ShipmentEvent::TrackingUpdate(EtapeLivraison::PickedUp)).unwrap();
        assert_eq!(again.state, t.state);

        let done = apply(&t.state, ShipmentEvent::TrackingUpdate(EtapeLivraison::Delivered)).unwrap();
        assert_eq!(done.state.annonce, AnnonceStatut::Done);
        assert_eq!(done.state.tracking, Some(TrackingStatut::Delivered));
        assert_eq!(done.quote, Some(DevisStatut::Done));

        assert_eq!(
            apply(&done.state, ShipmentEvent::TrackingUpdate(EtapeLivraison::InTransit)).unwrap_err(),
            TransitionError::AlreadyDelivered
        );
    }

    #[test]
    fn test_tracking_without_accepted_quote() {
        assert_eq!(
            apply(&open(), ShipmentEvent::TrackingUpdate(EtapeLivraison::PickedUp)).unwrap_err(),
            TransitionError::NoAcceptedQuote
        );
    }

    #[test]
    fn test_out_for_delivery_maps_to_in_transit() {
        assert_eq!(tracking_for(EtapeLivraison::OutForDelivery), TrackingStatut::InTransit);
        assert_eq!(tracking_for(EtapeLivraison::PickupScheduled), TrackingStatut::AwaitingPickup);
    }

    #[test]
    fn test_cancel_accepted_quote_reopens_annonce() {
        let t = apply(&accepted(), ShipmentEvent::QuoteCancelled { quote: DevisStatut::Accepted }).unwrap();
        assert_eq!(t.state, open());
        assert_eq!(t.quote, Some(DevisStatut::Cancelled));
    }

    #[test]
    fn test_cancel_after_pickup_is_rejected() {
        let started = apply(&accepted(), ShipmentEvent::TrackingUpdate(EtapeLivraison::PickedUp))
            .unwrap()
            .state;
        assert_eq!(
            apply(&started, ShipmentEvent::QuoteCancelled { quote: DevisStatut::InProgress }).unwrap_err(),
            TransitionError::InvalidQuoteState(DevisStatut::InProgress)
        );

        let paid = apply(&accepted(), ShipmentEvent::PaymentSucceeded).unwrap().state;
        assert_eq!(
            apply(&paid, ShipmentEvent::QuoteCancelled { quote: DevisStatut::Accepted }).unwrap_err(),
            TransitionError::AlreadyPaid
        );
    }

    #[test]
    fn test_payment_moves_annonce_to_pending() {
        let t = apply(&accepted(), ShipmentEvent::PaymentSucceeded).unwrap();
        assert_eq!(t.state.annonce, AnnonceStatut::Pending);
        assert!(t.state.paid);

        assert_eq!(
            apply(&t.state, ShipmentEvent::PaymentSucceeded).unwrap_err(),
            TransitionError::AlreadyPaid
        );
        assert_eq!(
            apply(&t.state, ShipmentEvent::AnnonceCancelled).unwrap_err(),
            TransitionError::AlreadyPaid
        );

        let shipped = apply(&t.state, ShipmentEvent::TrackingUpdate(EtapeLivraison::InTransit)).unwrap();
        assert_eq!(shipped.state.annonce, AnnonceStatut::InProgress);
    }

    #[test]
    fn test_confirm_receipt_requires_delivery() {
        assert_eq!(
            apply(&accepted(), ShipmentEvent::ReceiptConfirmed).unwrap_err(),
            TransitionError::NotDelivered
        );
        let done = apply(&accepted(), ShipmentEvent::TrackingUpdate(EtapeLivraison::Delivered))
            .unwrap()
            .state;
        assert!(apply(&done, ShipmentEvent::ReceiptConfirmed).is_ok());
        assert!(apply(&done, ShipmentEvent::IssueReported).is_ok());
        assert_eq!(
            apply(&accepted(), ShipmentEvent::IssueReported).unwrap_err(),
            TransitionError::NotStarted
        );
    }

    #[test]
    fn test_cancel_annonce() {
        let t = apply(&accepted(), ShipmentEvent::AnnonceCancelled).unwrap();
        assert_eq!(t.state.annonce, AnnonceStatut::Cancelled);
        assert_eq!(t.state.accepted_devis, Some(DevisStatut::Cancelled));
        assert_eq!(t.state.tracking, None);

        assert_eq!(
            apply(&t.state, ShipmentEvent::AnnonceCancelled).unwrap_err(),
            TransitionError::AnnonceCancelled
        );
    }

    #[test]
    fn test_refuse_only_pending() {
        assert_eq!(
            apply(&open(), ShipmentEvent::QuoteRefused { quote: DevisStatut::Pending })
                .unwrap()
                .quote,
            Some(DevisStatut::Refused)
        );
        assert_eq!(
            apply(&open(), ShipmentEvent::QuoteRefused { quote: DevisStatut::Cancelled }).unwrap_err(),
            TransitionError::InvalidQuoteState(DevisStatut::Cancelled)
        );
    }
}
