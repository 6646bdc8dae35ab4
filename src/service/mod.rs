use chrono::Utc;

use std::sync::Arc;

use crate::{
    config::Recipients,
    format::format_payload,
    models::{NotificationKind, NotificationPayload, OutgoingEmail},
    smtp::{Mailer, SmtpError},
};

/// Turns portal submissions into delivered notification emails.
#[derive(Clone)]
pub struct NotificationService {
    mailer: Arc<dyn Mailer>,
    recipients: Recipients,
}

impl NotificationService {
    pub fn new(mailer: Arc<dyn Mailer>, recipients: Recipients) -> Self {
        Self { mailer, recipients }
    }

    pub fn recipient(&self, kind: NotificationKind) -> &str {
        match kind {
            NotificationKind::Partner => &self.recipients.partner,
            NotificationKind::Support => &self.recipients.support,
            NotificationKind::Referral => &self.recipients.admin,
        }
    }

    /// Formats and sends one notification. Nothing is retried on failure.
    pub async fn notify(&self, payload: NotificationPayload) -> Result<String, SmtpError> {
        let kind = payload.kind();
        let message = format_payload(&payload, Utc::now());
        let email = OutgoingEmail::new(self.recipient(kind), message);

        tracing::info!(
            kind = %kind,
            to = %email.to,
            "Sending notification with subject '{}'",
            email.subject
        );

        match self.mailer.send(&email).await {
            Ok(()) => Ok(format!("{kind} notification sent successfully")),
            Err(e) => {
                tracing::error!(kind = %kind, error = %e, "Failed to send notification");
                Err(e)
            }
        }
    }
}
