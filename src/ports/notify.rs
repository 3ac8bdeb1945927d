//! Best-effort notifications (email on assignment and solution events).

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::core_types::{CaseId, UserId};
use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub recipient: UserId,
    pub case_id: CaseId,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), CoreError>;
}

/// Writes notifications to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl NotificationPort for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), CoreError> {
        tracing::info!(
            recipient = %notification.recipient,
            case_id = %notification.case_id,
            subject = %notification.subject,
            "Notification"
        );
        Ok(())
    }
}

/// Deliver in the background; failures are logged and dropped.
pub fn notify_best_effort(port: &Arc<dyn NotificationPort>, notification: Notification) {
    let port = port.clone();
    tokio::spawn(async move {
        let recipient = notification.recipient;
        let case_id = notification.case_id;
        if let Err(e) = port.notify(notification).await {
            tracing::error!(
                recipient = %recipient,
                case_id = %case_id,
                error = %e,
                "Notification delivery failed"
            );
        }
    });
}
