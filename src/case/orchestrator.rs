//! Case Lifecycle Orchestrator
//!
//! Entry point for every mutating operation. Case-level transitions are
//! implemented here; bidding and payment are delegated to the offer engine
//! and payment adapter, which share the same store, audit trail and ports.
//!
//! Each successful call records exactly one audit event after its
//! transaction commits.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use super::state::{CaseAction, CaseStatus, manual_action_for};
use super::types::{Case, Transition};
use crate::audit::{AuditEvent, AuditKind, AuditTrail};
use crate::authz::{Action, authorize, authorize_global};
use crate::core_types::{Actor, CaseId, Category, OfferId, Role, UserId};
use crate::error::CoreError;
use crate::offer::{Offer, OfferEngine, OfferPolicy, SweepReport};
use crate::payment::{Payment, PaymentAdapter, PaymentGateway, WebhookOutcome};
use crate::ports::{DomainEvent, EventKind, Notification, Ports, notify_best_effort};
use crate::store::{Store, lock_live_case};

const MAX_TITLE_LEN: usize = 200;

/// Input for `create_case`. Category is free text, parsed at the boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCase {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
}

pub struct CaseOrchestrator {
    store: Arc<dyn Store>,
    audit: AuditTrail,
    ports: Ports,
    offers: Arc<OfferEngine>,
    payments: Arc<PaymentAdapter>,
}

impl CaseOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        audit: AuditTrail,
        ports: Ports,
        offers: Arc<OfferEngine>,
        payments: Arc<PaymentAdapter>,
    ) -> Self {
        Self {
            store,
            audit,
            ports,
            offers,
            payments,
        }
    }

    /// Wire the offer engine and payment adapter over one store.
    pub fn assemble(
        store: Arc<dyn Store>,
        ports: Ports,
        gateway: Arc<dyn PaymentGateway>,
        currency: &str,
        policy: OfferPolicy,
    ) -> Self {
        let audit = AuditTrail::new(store.clone());
        let offers = Arc::new(OfferEngine::new(
            store.clone(),
            audit.clone(),
            ports.clone(),
            policy,
        ));
        let payments = Arc::new(PaymentAdapter::new(
            store.clone(),
            audit.clone(),
            ports.clone(),
            gateway,
            currency,
        ));
        Self::new(store, audit, ports, offers, payments)
    }

    pub fn offers(&self) -> &Arc<OfferEngine> {
        &self.offers
    }

    pub fn payments(&self) -> &Arc<PaymentAdapter> {
        &self.payments
    }

    // ========================================================================
    // Case lifecycle
    // ========================================================================

    pub async fn create_case(&self, actor: &Actor, input: NewCase) -> Result<Case, CoreError> {
        authorize_global(actor, Action::CreateCase)?;

        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(CoreError::validation("Title is required"));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(CoreError::validation(format!(
                "Title exceeds {} characters",
                MAX_TITLE_LEN
            )));
        }
        let category: Category = input.category.parse().map_err(CoreError::Validation)?;

        let case = Case::new(
            actor.id,
            title,
            input.description.trim().to_string(),
            category,
            Utc::now(),
        );
        let mut tx = self.store.begin().await?;
        tx.insert_case(&case).await?;
        let event = AuditEvent::new(case.id, AuditKind::CaseCreated, actor, "Case created")
            .with_new_status(case.status);
        tx.commit().await?;

        info!(case_id = %case.id, owner = %actor.id, category = %category, "Case created");
        self.audit.record(event).await;
        Ok(case)
    }

    pub async fn get_case(&self, case_id: CaseId, actor: &Actor) -> Result<Case, CoreError> {
        let case = self.visible_case(case_id, actor).await?;
        authorize(actor, &case, Action::ViewCase)?;
        Ok(case)
    }

    /// DRAFT -> PUBLISHED. Title and description must be filled in.
    pub async fn publish(&self, case_id: CaseId, actor: &Actor) -> Result<Case, CoreError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut case = lock_live_case(&mut tx, case_id, actor).await?;
        authorize(actor, &case, Action::Publish)?;

        if case.status != CaseStatus::Draft {
            return Err(CoreError::validation(format!(
                "Only DRAFT cases can be published; case {} is {}",
                case.id, case.status
            )));
        }
        if case.title.trim().is_empty() || case.description.trim().is_empty() {
            return Err(CoreError::validation(
                "Title and description are required to publish",
            ));
        }

        let transition = case.apply(CaseAction::Publish, now)?;
        tx.update_case(&case).await?;
        let event = status_event(&case, &transition, actor, "Case published");
        tx.commit().await?;

        self.after_transition(&case, &transition, actor, event).await;
        Ok(case)
    }

    /// Manual moves: hold, resume, close, retry payment, verify.
    pub async fn update_status(
        &self,
        case_id: CaseId,
        new_status: CaseStatus,
        actor: &Actor,
    ) -> Result<Case, CoreError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut case = lock_live_case(&mut tx, case_id, actor).await?;

        let Some(action) = manual_action_for(case.status, new_status) else {
            // Authorization first, so strangers learn nothing about state
            authorize(actor, &case, Action::UpdateStatus)?;
            return Err(CoreError::conflict(format!(
                "Case {} cannot move from {} to {}",
                case.id, case.status, new_status
            )));
        };
        let guard = match action {
            CaseAction::RetryPayment => Action::RetryPayment,
            CaseAction::Verify => Action::Verify,
            _ => Action::UpdateStatus,
        };
        authorize(actor, &case, guard)?;

        let transition = case.apply(action, now)?;
        if action == CaseAction::Close
            && let Some(provider) = case.assigned_provider_id
        {
            tx.increment_completed_cases(provider).await?;
        }
        tx.update_case(&case).await?;
        let message = format!("Status changed by {}", action);
        let event = status_event(&case, &transition, actor, &message);
        tx.commit().await?;

        self.after_transition(&case, &transition, actor, event).await;
        Ok(case)
    }

    /// Legacy direct assignment, bypassing bidding. DRAFT/PUBLISHED ->
    /// PENDING_APPROVAL.
    pub async fn assign_direct(
        &self,
        case_id: CaseId,
        provider_id: UserId,
        actor: &Actor,
    ) -> Result<Case, CoreError> {
        let profile = self
            .ports
            .directory
            .resolve(provider_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Provider", provider_id))?;
        if profile.role != Role::Provider {
            return Err(CoreError::validation(format!(
                "User {} is not a provider",
                provider_id
            )));
        }

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut case = lock_live_case(&mut tx, case_id, actor).await?;
        authorize(actor, &case, Action::AssignDirect)?;

        if provider_id == case.owner_id {
            return Err(CoreError::validation("Owner cannot be assigned to own case"));
        }
        if let Some(existing) = case.assigned_provider_id {
            return Err(CoreError::conflict(format!(
                "Case {} is already assigned to provider {}",
                case.id, existing
            )));
        }
        let active = tx
            .offers_for_case(case_id)
            .await?
            .iter()
            .filter(|o| o.status.is_active())
            .count();
        if active > 0 {
            return Err(CoreError::conflict(format!(
                "Case {} has {} active offer(s); accept one instead",
                case.id, active
            )));
        }

        let transition = case.apply(CaseAction::AssignDirect, now)?;
        case.assigned_provider_id = Some(provider_id);
        tx.update_case(&case).await?;
        let event = AuditEvent::new(
            case.id,
            AuditKind::ProviderAssigned,
            actor,
            format!("Provider {} assigned directly", provider_id),
        )
        .with_transition(&transition);
        tx.commit().await?;

        self.audit.record(event).await;
        self.publish_status(&case);
        notify_best_effort(
            &self.ports.notifier,
            Notification {
                recipient: provider_id,
                case_id: case.id,
                subject: "New case assignment".into(),
                body: format!("You have been asked to take on \"{}\".", case.title),
            },
        );
        info!(case_id = %case.id, provider = %provider_id, "Provider assigned directly");
        Ok(case)
    }

    /// The directly assigned provider turns the case down.
    pub async fn decline_assignment(&self, case_id: CaseId, actor: &Actor) -> Result<Case, CoreError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut case = lock_live_case(&mut tx, case_id, actor).await?;
        authorize(actor, &case, Action::DeclineAssignment)?;

        let transition = case.apply(CaseAction::DeclineAssignment, now)?;
        case.assigned_provider_id = None;
        tx.update_case(&case).await?;
        let event = AuditEvent::new(
            case.id,
            AuditKind::AssignmentDeclined,
            actor,
            format!("Provider {} declined the assignment", actor.id),
        )
        .with_transition(&transition);
        tx.commit().await?;

        self.audit.record(event).await;
        self.publish_status(&case);
        notify_best_effort(
            &self.ports.notifier,
            Notification {
                recipient: case.owner_id,
                case_id: case.id,
                subject: "Assignment declined".into(),
                body: format!("Your case \"{}\" is open for offers again.", case.title),
            },
        );
        Ok(case)
    }

    /// Work update from the assigned provider. No status change.
    pub async fn record_solution_update(
        &self,
        case_id: CaseId,
        note: &str,
        actor: &Actor,
    ) -> Result<Case, CoreError> {
        let note = note.trim();
        if note.is_empty() {
            return Err(CoreError::validation("Solution note is required"));
        }

        let case = self.visible_case(case_id, actor).await?;
        authorize(actor, &case, Action::UpdateSolution)?;
        if !matches!(case.status, CaseStatus::InProgress | CaseStatus::OnHold) {
            return Err(CoreError::conflict(format!(
                "Case {} is {}; solution updates need an engagement in progress",
                case.id, case.status
            )));
        }

        self.audit
            .record(
                AuditEvent::new(case.id, AuditKind::SolutionUpdated, actor, note)
                    .with_statuses(case.status, case.status),
            )
            .await;
        self.ports.broadcast.publish(
            DomainEvent::new(EventKind::SolutionUpdated, case.id, vec![case.owner_id])
                .with_status(case.status),
        );
        notify_best_effort(
            &self.ports.notifier,
            Notification {
                recipient: case.owner_id,
                case_id: case.id,
                subject: "Solution updated".into(),
                body: format!("Your provider posted an update on \"{}\".", case.title),
            },
        );
        Ok(case)
    }

    /// Admin soft delete; the row is kept. Deleting twice is a no-op.
    pub async fn soft_delete(&self, case_id: CaseId, actor: &Actor) -> Result<Case, CoreError> {
        let mut tx = self.store.begin().await?;
        let mut case = lock_live_case(&mut tx, case_id, actor).await?;
        authorize(actor, &case, Action::SoftDelete)?;
        if case.deleted {
            return Ok(case);
        }

        case.deleted = true;
        case.updated_at = Utc::now();
        tx.update_case(&case).await?;
        let event = AuditEvent::new(
            case.id,
            AuditKind::CaseDeleted,
            actor,
            format!("Case soft-deleted in status {}", case.status),
        );
        tx.commit().await?;

        info!(case_id = %case.id, admin = %actor.id, status = %case.status, "Case soft-deleted");
        self.audit.record(event).await;
        Ok(case)
    }

    /// Audit history, newest first.
    pub async fn timeline(&self, case_id: CaseId, actor: &Actor) -> Result<Vec<AuditEvent>, CoreError> {
        let case = self.visible_case(case_id, actor).await?;
        authorize(actor, &case, Action::ViewCase)?;
        self.audit.timeline(case_id).await
    }

    pub async fn completed_cases(&self, provider: UserId) -> Result<u64, CoreError> {
        self.store.completed_cases(provider).await
    }

    // ========================================================================
    // Bidding and payment
    // ========================================================================

    pub async fn submit_offer(
        &self,
        case_id: CaseId,
        proposed_fee: Decimal,
        actor: &Actor,
    ) -> Result<Offer, CoreError> {
        self.offers.submit_offer(case_id, proposed_fee, actor).await
    }

    pub async fn accept_offer(&self, offer_id: OfferId, actor: &Actor) -> Result<Offer, CoreError> {
        self.offers.accept_offer(offer_id, actor).await
    }

    pub async fn withdraw_offer(&self, offer_id: OfferId, actor: &Actor) -> Result<Offer, CoreError> {
        self.offers.withdraw_offer(offer_id, actor).await
    }

    pub async fn list_offers(&self, case_id: CaseId, actor: &Actor) -> Result<Vec<Offer>, CoreError> {
        self.offers.list_offers(case_id, actor).await
    }

    pub async fn sweep_expired_offers(
        &self,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, CoreError> {
        self.offers.sweep_as(actor, now).await
    }

    pub async fn create_order(&self, case_id: CaseId, actor: &Actor) -> Result<Payment, CoreError> {
        self.payments.create_order(case_id, actor).await
    }

    pub async fn verify_payment(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
        actor: &Actor,
    ) -> Result<Payment, CoreError> {
        self.payments
            .verify(order_id, payment_id, signature, actor)
            .await
    }

    pub async fn handle_webhook(&self, raw_body: &[u8], signature_header: &str) -> WebhookOutcome {
        self.payments.handle_webhook(raw_body, signature_header).await
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn visible_case(&self, case_id: CaseId, actor: &Actor) -> Result<Case, CoreError> {
        self.store
            .case(case_id)
            .await?
            .filter(|c| !c.deleted || actor.is_admin())
            .ok_or_else(|| CoreError::not_found("Case", case_id))
    }

    fn publish_status(&self, case: &Case) {
        let mut recipients = vec![case.owner_id];
        recipients.extend(case.assigned_provider_id);
        self.ports.broadcast.publish(
            DomainEvent::new(EventKind::CaseStatusChanged, case.id, recipients).with_status(case.status),
        );
    }

    async fn after_transition(&self, case: &Case, transition: &Transition, actor: &Actor, event: AuditEvent) {
        info!(
            case_id = %case.id,
            action = %transition.action,
            from = %transition.from,
            to = %transition.to,
            actor = %actor.id,
            "Case status changed"
        );
        self.audit.record(event).await;
        self.publish_status(case);
    }
}

/// Built before commit so `created_at` follows the per-case lock order.
fn status_event(case: &Case, transition: &Transition, actor: &Actor, message: &str) -> AuditEvent {
    AuditEvent::new(case.id, AuditKind::StatusChanged, actor, message).with_transition(transition)
}
