use crate::db::models::NotificationKind;
use crate::db::notifications::{create_notification, NewNotification};
use crate::db::DbPool;

/// Notification à envoyer après la validation d'une écriture.
pub struct Notice<'a> {
    pub user_id: &'a str,
    pub kind: NotificationKind,
    pub titre: &'a str,
    pub message: String,
    pub annonce_id: Option<&'a str>,
    pub devis_id: Option<&'a str>,
}

impl<'a> Notice<'a> {
    pub fn new(user_id: &'a str, kind: NotificationKind, titre: &'a str, message: String) -> Self {
        Self {
            user_id,
            kind,
            titre,
            message,
            annonce_id: None,
            devis_id: None,
        }
    }

    pub fn annonce(mut self, annonce_id: &'a str) -> Self {
        self.annonce_id = Some(annonce_id);
        self
    }

    pub fn devis(mut self, devis_id: &'a str) -> Self {
        self.devis_id = Some(devis_id);
        self
    }
}

/// Enregistre une notification; un échec est journalisé et n'interrompt pas la requête.
pub async fn notify(pool: &DbPool, notice: Notice<'_>) {
    let result = create_notification(
        pool,
        NewNotification {
            user_id: notice.user_id,
            kind: notice.kind,
            titre: notice.titre,
            message: &notice.message,
            annonce_id: notice.annonce_id,
            devis_id: notice.devis_id,
        },
    )
    .await;

    if let Err(e) = result {
        tracing::warn!(
            "⚠️ Notification {:?} non enregistrée pour {}: {}",
            notice.kind,
            notice.user_id,
            e
        );
    }
}
