//! Payment FSM State Definitions
//!
//! ```text
//! PENDING ─▶ SUCCESS ─▶ SETTLED
//!    │          ├─────▶ REFUNDED
//!    │          └─────▶ DISPUTED ─▶ REFUNDED | SETTLED
//!    ├─────▶ FAILED
//!    └─────▶ EXPIRED
//! ```
//!
//! Each attempt leaves PENDING exactly once. After SUCCESS only settlement
//! and refund moves are possible.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Expired,
    Refunded,
    Disputed,
    Settled,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 7] = [
        PaymentStatus::Pending,
        PaymentStatus::Success,
        PaymentStatus::Failed,
        PaymentStatus::Expired,
        PaymentStatus::Refunded,
        PaymentStatus::Disputed,
        PaymentStatus::Settled,
    ];

    /// Still waiting on the gateway; may be reused for a duplicate order request.
    #[inline]
    pub fn is_open(&self) -> bool {
        *self == PaymentStatus::Pending
    }

    /// Money was captured at some point.
    #[inline]
    pub fn is_captured(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Success
                | PaymentStatus::Settled
                | PaymentStatus::Refunded
                | PaymentStatus::Disputed
        )
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus as P;
        matches!(
            (self, next),
            (P::Pending, P::Success | P::Failed | P::Expired)
                | (P::Success, P::Settled | P::Refunded | P::Disputed)
                | (P::Disputed, P::Refunded | P::Settled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Expired => "EXPIRED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::Disputed => "DISPUTED",
            PaymentStatus::Settled => "SETTLED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let canonical = s.trim().to_uppercase();
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == canonical)
            .ok_or_else(|| format!("Invalid payment status: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_leaves_once() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Success));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Failed));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Expired));
        assert!(!PaymentStatus::Failed.can_transition_to(PaymentStatus::Success));
        assert!(!PaymentStatus::Expired.can_transition_to(PaymentStatus::Success));
    }

    #[test]
    fn test_success_is_immutable_except_settlement() {
        for next in PaymentStatus::ALL {
            let allowed = PaymentStatus::Success.can_transition_to(next);
            let expected = matches!(
                next,
                PaymentStatus::Settled | PaymentStatus::Refunded | PaymentStatus::Disputed
            );
            assert_eq!(allowed, expected, "SUCCESS -> {}", next);
        }
    }

    #[test]
    fn test_dispute_resolution() {
        assert!(PaymentStatus::Disputed.can_transition_to(PaymentStatus::Refunded));
        assert!(PaymentStatus::Disputed.can_transition_to(PaymentStatus::Settled));
        assert!(!PaymentStatus::Settled.can_transition_to(PaymentStatus::Refunded));
    }

    #[test]
    fn test_open_and_captured() {
        assert!(PaymentStatus::Pending.is_open());
        assert!(!PaymentStatus::Failed.is_open());
        assert!(PaymentStatus::Settled.is_captured());
        assert!(!PaymentStatus::Pending.is_captured());
        assert!(!PaymentStatus::Failed.is_captured());
    }

    #[test]
    fn test_display_roundtrip() {
        for status in PaymentStatus::ALL {
            assert_eq!(status.to_string().parse::<PaymentStatus>().unwrap(), status);
        }
    }
}
