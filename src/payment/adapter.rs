//! Payment Settlement Adapter
//!
//! Turns an accepted offer into a confirmed engagement:
//!
//! 1. `create_order`: gateway order for the agreed fee plus commission.
//!    The gateway call runs with no transaction open; only its result is
//!    persisted, under the case lock.
//! 2. `verify` (synchronous checkout) or `handle_webhook` (asynchronous):
//!    payment SUCCESS, offer FUNDED and case IN_PROGRESS in one transaction.
//!    Whichever arrives second finds SUCCESS and does nothing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use super::gateway::{OrderRequest, PaymentGateway};
use super::state::PaymentStatus;
use super::types::Payment;
use super::webhook::WebhookEvent;
use crate::audit::{AuditEvent, AuditKind, AuditTrail};
use crate::authz::{Action, authorize};
use crate::case::{Case, CaseAction, CaseStatus, Transition};
use crate::core_types::{Actor, CaseId, OfferId};
use crate::error::CoreError;
use crate::money::FeeBreakdown;
use crate::offer::OfferStatus;
use crate::ports::{DomainEvent, EventKind, Notification, Ports, notify_best_effort};
use crate::store::{Store, StoreTx, lock_live_case};

/// What a webhook delivery did. The HTTP layer answers 200 regardless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied,
    /// Already in the target state
    Duplicate,
    /// Signature did not verify; nothing was read from the body
    Rejected,
    Ignored,
    /// Processing failed; logged for out-of-band remediation
    Failed(String),
}

pub struct PaymentAdapter {
    store: Arc<dyn Store>,
    audit: AuditTrail,
    ports: Ports,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
}

/// Fee source for a new order: the accepted offer, else the case's agreed fee.
async fn agreed_fee(
    tx: &mut Box<dyn StoreTx>,
    case: &Case,
) -> Result<(Option<OfferId>, Decimal), CoreError> {
    let accepted = tx
        .offers_for_case(case.id)
        .await?
        .into_iter()
        .find(|o| o.status == OfferStatus::Accepted);
    match (accepted, case.agreed_fee) {
        (Some(offer), _) => Ok((Some(offer.id), offer.proposed_fee)),
        (None, Some(fee)) => Ok((None, fee)),
        (None, None) => Err(CoreError::validation(format!(
            "Case {} has no agreed fee",
            case.id
        ))),
    }
}

fn require_payable(case: &Case) -> Result<(), CoreError> {
    if case.status != CaseStatus::PaymentPending {
        return Err(CoreError::conflict(format!(
            "Case {} is {}; payment requires {}",
            case.id,
            case.status,
            CaseStatus::PaymentPending
        )));
    }
    if case.assigned_provider_id.is_none() {
        return Err(CoreError::validation(format!(
            "Case {} has no assigned provider",
            case.id
        )));
    }
    Ok(())
}

impl PaymentAdapter {
    pub fn new(
        store: Arc<dyn Store>,
        audit: AuditTrail,
        ports: Ports,
        gateway: Arc<dyn PaymentGateway>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            store,
            audit,
            ports,
            gateway,
            currency: currency.into(),
        }
    }

    // ========================================================================
    // Order creation
    // ========================================================================

    /// Create (or reuse) the PENDING payment for a case in PAYMENT_PENDING.
    pub async fn create_order(&self, case_id: CaseId, actor: &Actor) -> Result<Payment, CoreError> {
        // Phase 1: validate and reuse under the lock, then release it
        let (offer_id, fees, attempt) = {
            let mut tx = self.store.begin().await?;
            let case = lock_live_case(&mut tx, case_id, actor).await?;
            authorize(actor, &case, Action::CreateOrder)?;
            require_payable(&case)?;

            let payments = tx.payments_for_case(case_id).await?;
            if let Some(open) = payments.iter().find(|p| p.status.is_open()) {
                info!(
                    case_id = %case_id,
                    order_id = %open.gateway_order_id,
                    "Reusing pending payment order"
                );
                return Ok(open.clone());
            }
            let (offer_id, fee) = agreed_fee(&mut tx, &case).await?;
            (offer_id, FeeBreakdown::from_fee(fee), payments.len() + 1)
        };

        // Phase 2: gateway call, no transaction open
        let request = OrderRequest {
            amount_minor: fees.total_minor_units()?,
            currency: self.currency.clone(),
            receipt: format!("rcpt_{}_{}", case_id, attempt),
        };
        let order = self.gateway.create_order(&request).await.inspect_err(|e| {
            error!(
                case_id = %case_id,
                gateway = self.gateway.name(),
                receipt = %request.receipt,
                error = %e,
                "Gateway order creation failed"
            );
        })?;

        // Phase 3: persist, re-checking what may have changed meanwhile
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let case = lock_live_case(&mut tx, case_id, actor).await?;
        require_payable(&case)?;
        if let Some(winner) = tx
            .payments_for_case(case_id)
            .await?
            .into_iter()
            .find(|p| p.status.is_open())
        {
            warn!(
                case_id = %case_id,
                order_id = %winner.gateway_order_id,
                orphan_order_id = %order.id,
                "Concurrent order creation; keeping the first pending payment"
            );
            return Ok(winner);
        }

        let payment = Payment::pending(
            case_id,
            offer_id,
            fees,
            request.currency,
            request.receipt,
            order.id,
            now,
        );
        tx.insert_payment(&payment).await?;
        let event = AuditEvent::new(
            case_id,
            AuditKind::PaymentOrderCreated,
            actor,
            format!(
                "Order {} created for {} {} (fee {}, commission {})",
                payment.gateway_order_id,
                payment.total_amount,
                payment.currency,
                payment.provider_fee,
                payment.platform_commission
            ),
        )
        .with_statuses(case.status, case.status);
        tx.commit().await?;

        info!(
            case_id = %case_id,
            order_id = %payment.gateway_order_id,
            total = %payment.total_amount,
            attempt,
            "Payment order created"
        );
        self.audit.record(event).await;

        Ok(payment)
    }

    // ========================================================================
    // Confirmation
    // ========================================================================

    /// Synchronous checkout confirmation.
    ///
    /// A valid signature captures the payment; a repeat on a captured payment
    /// returns it unchanged. A mismatch fails the payment and the case, then
    /// returns `Validation`.
    pub async fn verify(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
        actor: &Actor,
    ) -> Result<Payment, CoreError> {
        let case_id = self.case_for_order(order_id).await?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let mut case = lock_live_case(&mut tx, case_id, actor).await?;
        authorize(actor, &case, Action::ConfirmPayment)?;
        let mut payment = tx
            .payment_by_order(order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Payment", order_id))?;

        if payment.status.is_captured() {
            info!(order_id, status = %payment.status, "Payment already confirmed");
            return Ok(payment);
        }
        if !payment.status.is_open() {
            return Err(CoreError::conflict(format!(
                "Payment {} is {}",
                order_id, payment.status
            )));
        }

        if !self
            .gateway
            .verify_payment_signature(order_id, payment_id, signature)
        {
            let transition =
                self.mark_failed(&mut tx, &mut case, &mut payment, "Signature mismatch", now).await?;
            let event = failure_event(&case, &payment, &transition, actor);
            tx.commit().await?;
            warn!(case_id = %case_id, order_id, "Payment signature mismatch");
            self.after_failure(&case, event).await;
            return Err(CoreError::validation("Payment signature mismatch"));
        }

        let transition = self
            .mark_captured(&mut tx, &mut case, &mut payment, payment_id, Some(signature), now)
            .await?;
        let event = capture_event(&case, &payment, &transition, actor);
        tx.commit().await?;
        self.after_capture(&case, &payment, event).await;
        Ok(payment)
    }

    /// Signed asynchronous notification from the gateway. Never fails.
    pub async fn handle_webhook(&self, raw_body: &[u8], signature_header: &str) -> WebhookOutcome {
        if !self.gateway.verify_webhook_signature(raw_body, signature_header) {
            warn!(bytes = raw_body.len(), "Webhook signature rejected");
            return WebhookOutcome::Rejected;
        }

        let event = match WebhookEvent::parse(raw_body) {
            Ok(event) => event,
            Err(e) => {
                error!(error = %e, "Unreadable webhook");
                return WebhookOutcome::Failed(e.to_string());
            }
        };

        let result = match &event {
            WebhookEvent::Captured {
                order_id,
                payment_id,
            } => self.capture_from_webhook(order_id, payment_id).await,
            WebhookEvent::Failed {
                order_id,
                payment_id,
                reason,
            } => {
                self.fail_from_webhook(order_id, payment_id, reason.as_deref())
                    .await
            }
            WebhookEvent::Unrecognized(name) => {
                info!(event = %name, "Ignoring webhook event");
                Ok(WebhookOutcome::Ignored)
            }
        };

        result.unwrap_or_else(|e| {
            error!(event = ?event, error = %e, "Webhook processing failed");
            WebhookOutcome::Failed(e.to_string())
        })
    }

    async fn capture_from_webhook(
        &self,
        order_id: &str,
        payment_id: &str,
    ) -> Result<WebhookOutcome, CoreError> {
        let case_id = self.case_for_order(order_id).await?;
        let system = Actor::system();
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let mut case = lock_live_case(&mut tx, case_id, &system).await?;
        let mut payment = tx
            .payment_by_order(order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Payment", order_id))?;

        if payment.status.is_captured() {
            info!(order_id, "Capture already applied");
            return Ok(WebhookOutcome::Duplicate);
        }
        if !payment.status.is_open() {
            error!(
                case_id = %case_id,
                order_id,
                payment_id,
                status = %payment.status,
                "Gateway captured a payment recorded as {}; manual remediation required",
                payment.status
            );
            return Ok(WebhookOutcome::Ignored);
        }

        let transition = self
            .mark_captured(&mut tx, &mut case, &mut payment, payment_id, None, now)
            .await?;
        let event = capture_event(&case, &payment, &transition, &system);
        tx.commit().await?;
        self.after_capture(&case, &payment, event).await;
        Ok(WebhookOutcome::Applied)
    }

    async fn fail_from_webhook(
        &self,
        order_id: &str,
        payment_id: &str,
        reason: Option<&str>,
    ) -> Result<WebhookOutcome, CoreError> {
        let case_id = self.case_for_order(order_id).await?;
        let system = Actor::system();
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let mut case = lock_live_case(&mut tx, case_id, &system).await?;
        let mut payment = tx
            .payment_by_order(order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Payment", order_id))?;

        if payment.status == PaymentStatus::Failed {
            return Ok(WebhookOutcome::Duplicate);
        }
        if !payment.status.is_open() {
            warn!(
                order_id,
                status = %payment.status,
                "Ignoring failure notice for settled payment"
            );
            return Ok(WebhookOutcome::Ignored);
        }

        payment.gateway_payment_id = Some(payment_id.to_string());
        let reason = reason.unwrap_or("Payment failed at gateway");
        let transition = self
            .mark_failed(&mut tx, &mut case, &mut payment, reason, now)
            .await?;
        let event = failure_event(&case, &payment, &transition, &system);
        tx.commit().await?;
        self.after_failure(&case, event).await;
        Ok(WebhookOutcome::Applied)
    }

    // ========================================================================
    // Post-capture administration
    // ========================================================================

    /// SUCCESS | DISPUTED -> SETTLED
    pub async fn settle(&self, order_id: &str, actor: &Actor) -> Result<Payment, CoreError> {
        self.admin_transition(order_id, PaymentStatus::Settled, AuditKind::PaymentSettled, actor)
            .await
    }

    /// SUCCESS | DISPUTED -> REFUNDED
    pub async fn refund(&self, order_id: &str, actor: &Actor) -> Result<Payment, CoreError> {
        self.admin_transition(order_id, PaymentStatus::Refunded, AuditKind::PaymentRefunded, actor)
            .await
    }

    /// SUCCESS -> DISPUTED
    pub async fn dispute(&self, order_id: &str, actor: &Actor) -> Result<Payment, CoreError> {
        self.admin_transition(order_id, PaymentStatus::Disputed, AuditKind::PaymentDisputed, actor)
            .await
    }

    async fn admin_transition(
        &self,
        order_id: &str,
        next: PaymentStatus,
        kind: AuditKind,
        actor: &Actor,
    ) -> Result<Payment, CoreError> {
        let case_id = self.case_for_order(order_id).await?;
        let mut tx = self.store.begin().await?;
        let case = lock_live_case(&mut tx, case_id, actor).await?;
        authorize(actor, &case, Action::ManagePayment)?;
        let mut payment = tx
            .payment_by_order(order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Payment", order_id))?;

        let previous = payment.status;
        payment.transition(next, Utc::now())?;
        tx.update_payment(&payment).await?;
        let event = AuditEvent::new(
            case_id,
            kind,
            actor,
            format!("Payment {} moved from {} to {}", order_id, previous, next),
        )
        .with_statuses(previous, next);
        tx.commit().await?;

        info!(case_id = %case_id, order_id, from = %previous, to = %next, "Payment updated");
        self.audit.record(event).await;
        Ok(payment)
    }

    // ========================================================================
    // Shared transitions
    // ========================================================================

    async fn case_for_order(&self, order_id: &str) -> Result<CaseId, CoreError> {
        self.store
            .payment_by_order(order_id)
            .await?
            .map(|p| p.case_id)
            .ok_or_else(|| CoreError::not_found("Payment", order_id))
    }

    /// Payment SUCCESS, accepted offer FUNDED, case IN_PROGRESS.
    async fn mark_captured(
        &self,
        tx: &mut Box<dyn StoreTx>,
        case: &mut Case,
        payment: &mut Payment,
        payment_id: &str,
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Transition, CoreError> {
        let transition = case.apply(CaseAction::PaymentConfirmed, now)?;

        payment.transition(PaymentStatus::Success, now)?;
        payment.gateway_payment_id = Some(payment_id.to_string());
        if let Some(signature) = signature {
            payment.signature = Some(signature.to_string());
        }
        tx.update_payment(payment).await?;

        if let Some(offer_id) = payment.offer_id
            && let Some(mut offer) = tx.offer(offer_id).await?
            && offer.status == OfferStatus::Accepted
        {
            offer.transition(OfferStatus::Funded, now)?;
            tx.update_offer(&offer).await?;
        }

        tx.update_case(case).await?;
        Ok(transition)
    }

    /// Payment FAILED with reason; case PAYMENT_FAILED.
    async fn mark_failed(
        &self,
        tx: &mut Box<dyn StoreTx>,
        case: &mut Case,
        payment: &mut Payment,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Transition, CoreError> {
        let transition = case.apply(CaseAction::PaymentFailed, now)?;
        payment.transition(PaymentStatus::Failed, now)?;
        payment.failure_reason = Some(reason.to_string());
        tx.update_payment(payment).await?;
        tx.update_case(case).await?;
        Ok(transition)
    }

    async fn after_capture(&self, case: &Case, payment: &Payment, event: AuditEvent) {
        info!(
            case_id = %case.id,
            order_id = %payment.gateway_order_id,
            "Payment captured; engagement started"
        );
        self.audit.record(event).await;

        let mut recipients = vec![case.owner_id];
        recipients.extend(case.assigned_provider_id);
        self.ports.broadcast.publish(
            DomainEvent::new(EventKind::PaymentUpdated, case.id, recipients).with_status(case.status),
        );
        if let Some(provider) = case.assigned_provider_id {
            notify_best_effort(
                &self.ports.notifier,
                Notification {
                    recipient: provider,
                    case_id: case.id,
                    subject: "Payment received".into(),
                    body: format!("Case {} \"{}\" is now in progress.", case.id, case.title),
                },
            );
        }
    }

    async fn after_failure(&self, case: &Case, event: AuditEvent) {
        self.audit.record(event).await;
        self.ports.broadcast.publish(
            DomainEvent::new(EventKind::PaymentUpdated, case.id, vec![case.owner_id])
                .with_status(case.status),
        );
    }
}

// Audit events are stamped while the case row is still locked.

fn capture_event(case: &Case, payment: &Payment, transition: &Transition, actor: &Actor) -> AuditEvent {
    AuditEvent::new(
        case.id,
        AuditKind::PaymentSucceeded,
        actor,
        format!(
            "Payment {} captured for order {}",
            payment.gateway_payment_id.as_deref().unwrap_or("-"),
            payment.gateway_order_id
        ),
    )
    .with_transition(transition)
}

fn failure_event(case: &Case, payment: &Payment, transition: &Transition, actor: &Actor) -> AuditEvent {
    AuditEvent::new(
        case.id,
        AuditKind::PaymentFailed,
        actor,
        format!(
            "Payment for order {} failed: {}",
            payment.gateway_order_id,
            payment.failure_reason.as_deref().unwrap_or("unknown")
        ),
    )
    .with_transition(transition)
}
