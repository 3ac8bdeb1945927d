//! Audit Trail
//!
//! Append-only history of every state change. Writes happen after the
//! business transaction commits and are best-effort: a failed append is
//! logged and swallowed, never rolled back into the operation it describes.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::case::Transition;
use crate::core_types::{Actor, AuditEventId, CaseId, Role, UserId};
use crate::error::CoreError;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditKind {
    CaseCreated,
    StatusChanged,
    OfferSubmitted,
    OfferAccepted,
    OfferWithdrawn,
    OffersExpired,
    ProviderAssigned,
    AssignmentDeclined,
    SolutionUpdated,
    PaymentOrderCreated,
    PaymentSucceeded,
    PaymentFailed,
    PaymentSettled,
    PaymentRefunded,
    PaymentDisputed,
    CaseDeleted,
}

impl AuditKind {
    pub const ALL: [AuditKind; 16] = [
        AuditKind::CaseCreated,
        AuditKind::StatusChanged,
        AuditKind::OfferSubmitted,
        AuditKind::OfferAccepted,
        AuditKind::OfferWithdrawn,
        AuditKind::OffersExpired,
        AuditKind::ProviderAssigned,
        AuditKind::AssignmentDeclined,
        AuditKind::SolutionUpdated,
        AuditKind::PaymentOrderCreated,
        AuditKind::PaymentSucceeded,
        AuditKind::PaymentFailed,
        AuditKind::PaymentSettled,
        AuditKind::PaymentRefunded,
        AuditKind::PaymentDisputed,
        AuditKind::CaseDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::CaseCreated => "CASE_CREATED",
            AuditKind::StatusChanged => "STATUS_CHANGED",
            AuditKind::OfferSubmitted => "OFFER_SUBMITTED",
            AuditKind::OfferAccepted => "OFFER_ACCEPTED",
            AuditKind::OfferWithdrawn => "OFFER_WITHDRAWN",
            AuditKind::OffersExpired => "OFFERS_EXPIRED",
            AuditKind::ProviderAssigned => "PROVIDER_ASSIGNED",
            AuditKind::AssignmentDeclined => "ASSIGNMENT_DECLINED",
            AuditKind::SolutionUpdated => "SOLUTION_UPDATED",
            AuditKind::PaymentOrderCreated => "PAYMENT_ORDER_CREATED",
            AuditKind::PaymentSucceeded => "PAYMENT_SUCCEEDED",
            AuditKind::PaymentFailed => "PAYMENT_FAILED",
            AuditKind::PaymentSettled => "PAYMENT_SETTLED",
            AuditKind::PaymentRefunded => "PAYMENT_REFUNDED",
            AuditKind::PaymentDisputed => "PAYMENT_DISPUTED",
            AuditKind::CaseDeleted => "CASE_DELETED",
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Invalid audit event type: {}", s))
    }
}

/// One immutable row of a case's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: AuditEventId,
    pub case_id: CaseId,
    pub event_type: AuditKind,
    pub old_status: Option<String>,
    pub new_status: Option<String>,
    pub message: String,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(case_id: CaseId, event_type: AuditKind, actor: &Actor, message: impl Into<String>) -> Self {
        Self {
            id: AuditEventId::new(),
            case_id,
            event_type,
            old_status: None,
            new_status: None,
            message: message.into(),
            actor_id: actor.id,
            actor_role: actor.role,
            created_at: Utc::now(),
        }
    }

    pub fn with_statuses(mut self, old: impl ToString, new: impl ToString) -> Self {
        self.old_status = Some(old.to_string());
        self.new_status = Some(new.to_string());
        self
    }

    /// Creation events have no prior status.
    pub fn with_new_status(mut self, new: impl ToString) -> Self {
        self.new_status = Some(new.to_string());
        self
    }

    pub fn with_transition(self, transition: &Transition) -> Self {
        self.with_statuses(transition.from, transition.to)
    }
}

/// Recorder shared by the orchestrator, offer engine and payment adapter.
#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn Store>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Append an event. Failures are logged, never returned.
    pub async fn record(&self, event: AuditEvent) {
        if let Err(e) = self.store.append_audit(&event).await {
            tracing::error!(
                case_id = %event.case_id,
                event_type = %event.event_type,
                error = %e,
                "Failed to write audit event"
            );
        }
    }

    /// Events for a case, newest first.
    pub async fn timeline(&self, case_id: CaseId) -> Result<Vec<AuditEvent>, CoreError> {
        let mut events = self.store.audit_events(case_id).await?;
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(events)
    }
}
