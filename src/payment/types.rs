//! Payment entity

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::state::PaymentStatus;
use crate::core_types::{CaseId, OfferId, PaymentId};
use crate::error::CoreError;
use crate::money::FeeBreakdown;

/// One payment attempt for an engagement, keyed by the gateway order id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub case_id: CaseId,
    /// `None` when the fee came from the case itself
    pub offer_id: Option<OfferId>,
    pub provider_fee: Decimal,
    pub platform_commission: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub receipt: String,
    /// Unique across all payments
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub signature: Option<String>,
    pub failure_reason: Option<String>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn pending(
        case_id: CaseId,
        offer_id: Option<OfferId>,
        fees: FeeBreakdown,
        currency: String,
        receipt: String,
        gateway_order_id: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            case_id,
            offer_id,
            provider_fee: fees.provider_fee,
            platform_commission: fees.platform_commission,
            total_amount: fees.total_amount,
            currency,
            receipt,
            gateway_order_id,
            gateway_payment_id: None,
            signature: None,
            failure_reason: None,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, next: PaymentStatus, now: DateTime<Utc>) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::conflict(format!(
                "Payment {} cannot move from {} to {}",
                self.gateway_order_id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}
