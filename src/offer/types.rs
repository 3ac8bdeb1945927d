//! Offer entity

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::state::OfferStatus;
use crate::core_types::{CaseId, OfferId, UserId};
use crate::error::CoreError;

/// A provider's bid against a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub case_id: CaseId,
    pub provider_id: UserId,
    pub proposed_fee: Decimal,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
    /// `created_at + ttl`
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
}

impl Offer {
    pub fn new(
        case_id: CaseId,
        provider_id: UserId,
        proposed_fee: Decimal,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OfferId::new(),
            case_id,
            provider_id,
            proposed_fee,
            status: OfferStatus::Submitted,
            created_at: now,
            expires_at: now + ttl,
            accepted_at: None,
            rejected_at: None,
        }
    }

    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == OfferStatus::Submitted && self.expires_at < now
    }

    /// Move forward through the offer FSM, stamping the relevant timestamp.
    pub fn transition(&mut self, next: OfferStatus, now: DateTime<Utc>) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::conflict(format!(
                "Offer {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        match next {
            OfferStatus::Accepted => self.accepted_at = Some(now),
            OfferStatus::Rejected => self.rejected_at = Some(now),
            _ => {}
        }
        self.status = next;
        Ok(())
    }
}
