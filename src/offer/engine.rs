//! Offer Negotiation Engine
//!
//! Every mutation locks the case row first, so submit/accept/withdraw on the
//! same case are serialized and each re-checks the case status it depends
//! on. Two owners racing `accept_offer` on one case: the second sees
//! PAYMENT_PENDING and fails with `Conflict`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use super::state::OfferStatus;
use super::types::Offer;
use crate::audit::{AuditEvent, AuditKind, AuditTrail};
use crate::authz::{Action, authorize, authorize_global, authorize_offer};
use crate::case::{CaseAction, CaseStatus};
use crate::core_types::{Actor, CaseId, OfferId, UserId};
use crate::error::CoreError;
use crate::money::validate_fee;
use crate::ports::{DomainEvent, EventKind, Notification, Ports, notify_best_effort};
use crate::store::{Store, lock_live_case};

/// Bidding limits.
#[derive(Debug, Clone)]
pub struct OfferPolicy {
    /// Cap on concurrently SUBMITTED offers per case
    pub max_active_per_case: usize,
    pub ttl: Duration,
}

impl Default for OfferPolicy {
    fn default() -> Self {
        Self {
            max_active_per_case: 5,
            ttl: Duration::hours(48),
        }
    }
}

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub cases: usize,
    pub expired: usize,
}

pub struct OfferEngine {
    store: Arc<dyn Store>,
    audit: AuditTrail,
    ports: Ports,
    policy: OfferPolicy,
}

/// Offer ids carry no case; resolve the case before locking it.
async fn offer_case_id(store: &Arc<dyn Store>, offer_id: OfferId) -> Result<CaseId, CoreError> {
    store
        .offer(offer_id)
        .await?
        .map(|o| o.case_id)
        .ok_or_else(|| CoreError::not_found("Offer", offer_id))
}

impl OfferEngine {
    pub fn new(store: Arc<dyn Store>, audit: AuditTrail, ports: Ports, policy: OfferPolicy) -> Self {
        Self {
            store,
            audit,
            ports,
            policy,
        }
    }

    pub fn policy(&self) -> &OfferPolicy {
        &self.policy
    }

    /// Place a bid. Moves the case to UNDER_REVIEW in the same transaction.
    pub async fn submit_offer(
        &self,
        case_id: CaseId,
        proposed_fee: Decimal,
        actor: &Actor,
    ) -> Result<Offer, CoreError> {
        let proposed_fee = validate_fee(proposed_fee)?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let mut case = lock_live_case(&mut tx, case_id, actor).await?;
        authorize(actor, &case, Action::SubmitOffer)?;

        if !case.status.accepts_offers() {
            return Err(CoreError::conflict(format!(
                "Case {} is {} and not accepting offers",
                case.id, case.status
            )));
        }

        let offers = tx.offers_for_case(case_id).await?;
        if let Some(previous) = offers.iter().find(|o| o.provider_id == actor.id) {
            if !previous.status.allows_resubmission() {
                return Err(CoreError::conflict(format!(
                    "Provider {} already holds a {} offer on case {}",
                    actor.id, previous.status, case_id
                )));
            }
            tx.delete_offer(previous.id).await?;
        }

        let active = offers.iter().filter(|o| o.status.is_active()).count();
        if active >= self.policy.max_active_per_case {
            return Err(CoreError::conflict(format!(
                "Case {} already has {} active offers",
                case_id, active
            )));
        }

        let offer = Offer::new(case_id, actor.id, proposed_fee, self.policy.ttl, now);
        tx.insert_offer(&offer).await?;

        // A direct assignment turns into an ordinary bid
        if case.status == CaseStatus::PendingApproval {
            case.assigned_provider_id = None;
        }
        let transition = case.apply(CaseAction::ReceiveOffer, now)?;
        tx.update_case(&case).await?;
        let event = AuditEvent::new(
            case_id,
            AuditKind::OfferSubmitted,
            actor,
            format!("Offer {} submitted with fee {}", offer.id, offer.proposed_fee),
        )
        .with_transition(&transition);
        tx.commit().await?;

        info!(
            case_id = %case_id,
            offer_id = %offer.id,
            provider = %actor.id,
            fee = %offer.proposed_fee,
            active_offers = active + 1,
            "Offer submitted"
        );

        self.audit.record(event).await;
        self.ports.broadcast.publish(
            DomainEvent::new(EventKind::OfferSubmitted, case_id, vec![case.owner_id])
                .with_status(case.status)
                .with_offer(offer.id),
        );

        Ok(offer)
    }

    /// Accept one bid, reject every other SUBMITTED bid, assign the provider
    /// and move the case to PAYMENT_PENDING, atomically.
    pub async fn accept_offer(&self, offer_id: OfferId, actor: &Actor) -> Result<Offer, CoreError> {
        let case_id = offer_case_id(&self.store, offer_id).await?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let mut case = lock_live_case(&mut tx, case_id, actor).await?;
        authorize(actor, &case, Action::AcceptOffer)?;

        if !case.status.accepts_acceptance() {
            return Err(CoreError::conflict(format!(
                "Case {} is {}; offers can no longer be accepted",
                case.id, case.status
            )));
        }

        let offers = tx.offers_for_case(case_id).await?;
        let mut chosen = offers
            .iter()
            .find(|o| o.id == offer_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Offer", offer_id))?;

        if chosen.status != OfferStatus::Submitted {
            return Err(CoreError::conflict(format!(
                "Offer {} is {}",
                offer_id, chosen.status
            )));
        }
        if chosen.expires_at < now {
            return Err(CoreError::conflict(format!("Offer {} has expired", offer_id)));
        }
        if case.status == CaseStatus::PendingApproval
            && let Some(assigned) = case.assigned_provider_id
            && assigned != chosen.provider_id
        {
            return Err(CoreError::conflict(format!(
                "Case {} is pending approval by provider {}",
                case.id, assigned
            )));
        }

        chosen.transition(OfferStatus::Accepted, now)?;
        tx.update_offer(&chosen).await?;

        let mut rejected = Vec::new();
        for other in offers.iter().filter(|o| o.id != offer_id && o.status.is_active()) {
            let mut other = other.clone();
            other.transition(OfferStatus::Rejected, now)?;
            tx.update_offer(&other).await?;
            rejected.push(other.provider_id);
        }

        case.assigned_provider_id = Some(chosen.provider_id);
        case.agreed_fee = Some(chosen.proposed_fee);
        let transition = case.apply(CaseAction::AcceptOffer, now)?;
        tx.update_case(&case).await?;
        let event = AuditEvent::new(
            case_id,
            AuditKind::OfferAccepted,
            actor,
            format!(
                "Offer {} from provider {} accepted at {}; {} other offer(s) rejected",
                offer_id,
                chosen.provider_id,
                chosen.proposed_fee,
                rejected.len()
            ),
        )
        .with_transition(&transition);
        tx.commit().await?;

        info!(
            case_id = %case_id,
            offer_id = %offer_id,
            provider = %chosen.provider_id,
            rejected = rejected.len(),
            "Offer accepted"
        );

        self.audit.record(event).await;

        let mut recipients = vec![case.owner_id, chosen.provider_id];
        recipients.extend(rejected);
        self.ports.broadcast.publish(
            DomainEvent::new(EventKind::OfferAccepted, case_id, recipients)
                .with_status(case.status)
                .with_offer(offer_id),
        );
        notify_best_effort(
            &self.ports.notifier,
            Notification {
                recipient: chosen.provider_id,
                case_id,
                subject: "Your offer was accepted".into(),
                body: format!("Case {} \"{}\" is awaiting payment.", case_id, case.title),
            },
        );

        Ok(chosen)
    }

    /// Withdraw a SUBMITTED bid. The last withdrawal reopens bidding.
    pub async fn withdraw_offer(
        &self,
        offer_id: OfferId,
        actor: &Actor,
    ) -> Result<Offer, CoreError> {
        let case_id = offer_case_id(&self.store, offer_id).await?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let mut case = lock_live_case(&mut tx, case_id, actor).await?;
        let offers = tx.offers_for_case(case_id).await?;
        let mut offer = offers
            .iter()
            .find(|o| o.id == offer_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Offer", offer_id))?;
        authorize_offer(actor, &case, &offer, Action::WithdrawOffer)?;

        offer.transition(OfferStatus::Withdrawn, now)?;
        tx.update_offer(&offer).await?;

        let remaining = offers
            .iter()
            .filter(|o| o.id != offer_id && o.status.is_active())
            .count();
        let old_status = case.status;
        if remaining == 0 && case.status == CaseStatus::UnderReview {
            case.apply(CaseAction::ReopenBidding, now)?;
            tx.update_case(&case).await?;
        }
        let event = AuditEvent::new(
            case_id,
            AuditKind::OfferWithdrawn,
            actor,
            format!("Offer {} withdrawn; {} active offer(s) remain", offer_id, remaining),
        )
        .with_statuses(old_status, case.status);
        tx.commit().await?;

        info!(
            case_id = %case_id,
            offer_id = %offer_id,
            provider = %actor.id,
            remaining,
            "Offer withdrawn"
        );

        self.audit.record(event).await;
        self.ports.broadcast.publish(
            DomainEvent::new(EventKind::OfferWithdrawn, case_id, vec![case.owner_id])
                .with_status(case.status)
                .with_offer(offer_id),
        );

        Ok(offer)
    }

    /// Owner and admin see every offer; a provider sees only their own.
    pub async fn list_offers(&self, case_id: CaseId, actor: &Actor) -> Result<Vec<Offer>, CoreError> {
        let case = self
            .store
            .case(case_id)
            .await?
            .filter(|c| !c.deleted || actor.is_admin())
            .ok_or_else(|| CoreError::not_found("Case", case_id))?;
        authorize(actor, &case, Action::ListOffers)?;

        let offers = self.store.offers_for_case(case_id).await?;
        if case.is_owner(actor.id) || actor.is_admin() {
            Ok(offers)
        } else {
            Ok(offers
                .into_iter()
                .filter(|o| o.provider_id == actor.id)
                .collect())
        }
    }

    /// Admin-triggered sweep; see `sweep_expired_offers`.
    pub async fn sweep_as(&self, actor: &Actor, now: DateTime<Utc>) -> Result<SweepReport, CoreError> {
        authorize_global(actor, Action::SweepOffers)?;
        self.sweep_expired_offers(now).await
    }

    /// Expire every SUBMITTED offer with `expires_at < now`.
    ///
    /// One transaction per case; a failure on one case is logged and the
    /// sweep moves on. A case under review whose last active offer expires
    /// goes back to PUBLISHED, as after a withdrawal. Re-running is a no-op.
    pub async fn sweep_expired_offers(&self, now: DateTime<Utc>) -> Result<SweepReport, CoreError> {
        let case_ids = self.store.cases_with_expired_offers(now).await?;
        let mut report = SweepReport::default();

        for case_id in case_ids {
            match self.expire_case_offers(case_id, now).await {
                Ok(0) => {}
                Ok(expired) => {
                    report.cases += 1;
                    report.expired += expired;
                }
                Err(e) => {
                    warn!(case_id = %case_id, error = %e, "Failed to expire offers");
                }
            }
        }

        if report.expired > 0 {
            info!(cases = report.cases, expired = report.expired, "Expired stale offers");
        }
        Ok(report)
    }

    async fn expire_case_offers(&self, case_id: CaseId, now: DateTime<Utc>) -> Result<usize, CoreError> {
        let mut tx = self.store.begin().await?;
        let Some(mut case) = tx.lock_case(case_id).await? else {
            return Ok(0);
        };

        let mut providers: Vec<UserId> = Vec::new();
        let mut remaining = 0usize;
        for offer in tx.offers_for_case(case_id).await? {
            if offer.is_expired_at(now) {
                let mut offer = offer;
                offer.transition(OfferStatus::Expired, now)?;
                tx.update_offer(&offer).await?;
                providers.push(offer.provider_id);
            } else if offer.status.is_active() {
                remaining += 1;
            }
        }
        if providers.is_empty() {
            return Ok(0);
        }

        let old_status = case.status;
        if remaining == 0 && case.status == CaseStatus::UnderReview {
            case.apply(CaseAction::ReopenBidding, now)?;
            tx.update_case(&case).await?;
        }
        let expired = providers.len();
        let event = AuditEvent::new(
            case_id,
            AuditKind::OffersExpired,
            &Actor::system(),
            format!("{} offer(s) expired; {} active offer(s) remain", expired, remaining),
        )
        .with_statuses(old_status, case.status);
        tx.commit().await?;

        if case.status != old_status {
            info!(case_id = %case_id, "Last offer expired; bidding reopened");
        }
        self.audit.record(event).await;

        providers.push(case.owner_id);
        self.ports
            .broadcast
            .publish(DomainEvent::new(EventKind::OfferExpired, case_id, providers).with_status(case.status));

        Ok(expired)
    }
}
