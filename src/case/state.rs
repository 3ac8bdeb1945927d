//! Case FSM State Definitions
//!
//! ```text
//! DRAFT ──▶ PUBLISHED ⇄ UNDER_REVIEW ──▶ PAYMENT_PENDING ──▶ IN_PROGRESS ⇄ ON_HOLD
//!   │           │  ▲                        ▲     │  ▲              │          │
//!   │           ▼  │ decline                │     ▼  │ retry        ▼          │
//!   └──────▶ PENDING_APPROVAL ──────────────┘  PAYMENT_FAILED      CLOSED ◀─────┘
//!                                                                   │
//!                                                                VERIFIED
//! ```
//!
//! Every transition is looked up in a fixed `(state, action) → state` table.
//! Nothing outside this module decides whether a case may move.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Case FSM States
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    Draft,
    Published,
    UnderReview,
    /// Legacy direct owner-to-provider assignment awaiting the provider
    PendingApproval,
    PaymentPending,
    PaymentFailed,
    InProgress,
    OnHold,
    /// Terminal for the work lifecycle
    Closed,
    /// Administrative attestation of a closed case
    Verified,
}

impl CaseStatus {
    pub const ALL: [CaseStatus; 10] = [
        CaseStatus::Draft,
        CaseStatus::Published,
        CaseStatus::UnderReview,
        CaseStatus::PendingApproval,
        CaseStatus::PaymentPending,
        CaseStatus::PaymentFailed,
        CaseStatus::InProgress,
        CaseStatus::OnHold,
        CaseStatus::Closed,
        CaseStatus::Verified,
    ];

    /// States in which `assigned_provider_id` must be set.
    #[inline]
    pub fn requires_provider(&self) -> bool {
        matches!(
            self,
            CaseStatus::PendingApproval
                | CaseStatus::PaymentPending
                | CaseStatus::PaymentFailed
                | CaseStatus::InProgress
                | CaseStatus::OnHold
                | CaseStatus::Closed
                | CaseStatus::Verified
        )
    }

    /// States in which providers may submit offers.
    #[inline]
    pub fn accepts_offers(&self) -> bool {
        matches!(
            self,
            CaseStatus::Published | CaseStatus::UnderReview | CaseStatus::PendingApproval
        )
    }

    /// States from which the owner may accept an offer.
    #[inline]
    pub fn accepts_acceptance(&self) -> bool {
        matches!(self, CaseStatus::UnderReview | CaseStatus::PendingApproval)
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaseStatus::Closed | CaseStatus::Verified)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Draft => "DRAFT",
            CaseStatus::Published => "PUBLISHED",
            CaseStatus::UnderReview => "UNDER_REVIEW",
            CaseStatus::PendingApproval => "PENDING_APPROVAL",
            CaseStatus::PaymentPending => "PAYMENT_PENDING",
            CaseStatus::PaymentFailed => "PAYMENT_FAILED",
            CaseStatus::InProgress => "IN_PROGRESS",
            CaseStatus::OnHold => "ON_HOLD",
            CaseStatus::Closed => "CLOSED",
            CaseStatus::Verified => "VERIFIED",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let canonical = s.trim().to_uppercase();
        CaseStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == canonical)
            .ok_or_else(|| format!("Invalid case status: {}", s))
    }
}

/// Events that move a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaseAction {
    Publish,
    /// A provider submitted an offer
    ReceiveOffer,
    /// The last active offer was withdrawn
    ReopenBidding,
    /// Legacy owner-to-provider assignment
    AssignDirect,
    DeclineAssignment,
    AcceptOffer,
    PaymentConfirmed,
    PaymentFailed,
    RetryPayment,
    Hold,
    Resume,
    Close,
    Verify,
}

impl CaseAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseAction::Publish => "PUBLISH",
            CaseAction::ReceiveOffer => "RECEIVE_OFFER",
            CaseAction::ReopenBidding => "REOPEN_BIDDING",
            CaseAction::AssignDirect => "ASSIGN_DIRECT",
            CaseAction::DeclineAssignment => "DECLINE_ASSIGNMENT",
            CaseAction::AcceptOffer => "ACCEPT_OFFER",
            CaseAction::PaymentConfirmed => "PAYMENT_CONFIRMED",
            CaseAction::PaymentFailed => "PAYMENT_FAILED",
            CaseAction::RetryPayment => "RETRY_PAYMENT",
            CaseAction::Hold => "HOLD",
            CaseAction::Resume => "RESUME",
            CaseAction::Close => "CLOSE",
            CaseAction::Verify => "VERIFY",
        }
    }
}

impl fmt::Display for CaseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed transition table.
pub fn next_state(from: CaseStatus, action: CaseAction) -> Option<CaseStatus> {
    use CaseAction as A;
    use CaseStatus as S;

    match (from, action) {
        (S::Draft, A::Publish) => Some(S::Published),

        (S::Published | S::UnderReview | S::PendingApproval, A::ReceiveOffer) => {
            Some(S::UnderReview)
        }
        (S::UnderReview, A::ReopenBidding) => Some(S::Published),

        (S::Draft | S::Published, A::AssignDirect) => Some(S::PendingApproval),
        (S::PendingApproval, A::DeclineAssignment) => Some(S::Published),

        (S::UnderReview | S::PendingApproval, A::AcceptOffer) => Some(S::PaymentPending),

        (S::PaymentPending, A::PaymentConfirmed) => Some(S::InProgress),
        (S::PaymentPending, A::PaymentFailed) => Some(S::PaymentFailed),
        (S::PaymentFailed, A::RetryPayment) => Some(S::PaymentPending),

        (S::InProgress, A::Hold) => Some(S::OnHold),
        (S::OnHold, A::Resume) => Some(S::InProgress),
        (S::InProgress | S::OnHold, A::Close) => Some(S::Closed),
        (S::Closed, A::Verify) => Some(S::Verified),

        _ => None,
    }
}

/// Resolve a requested target status into the manual action that reaches it.
pub fn manual_action_for(from: CaseStatus, to: CaseStatus) -> Option<CaseAction> {
    [
        CaseAction::RetryPayment,
        CaseAction::Hold,
        CaseAction::Resume,
        CaseAction::Close,
        CaseAction::Verify,
    ]
    .into_iter()
    .find(|action| next_state(from, *action) == Some(to))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_through_bidding() {
        let mut state = CaseStatus::Draft;
        for action in [
            CaseAction::Publish,
            CaseAction::ReceiveOffer,
            CaseAction::AcceptOffer,
            CaseAction::PaymentConfirmed,
            CaseAction::Hold,
            CaseAction::Resume,
            CaseAction::Close,
            CaseAction::Verify,
        ] {
            state = next_state(state, action).unwrap();
        }
        assert_eq!(state, CaseStatus::Verified);
    }

    #[test]
    fn test_bidding_reverts_to_published() {
        assert_eq!(
            next_state(CaseStatus::UnderReview, CaseAction::ReopenBidding),
            Some(CaseStatus::Published)
        );
        assert_eq!(
            next_state(CaseStatus::Published, CaseAction::ReopenBidding),
            None
        );
    }

    #[test]
    fn test_payment_retry_loop() {
        let failed = next_state(CaseStatus::PaymentPending, CaseAction::PaymentFailed).unwrap();
        assert_eq!(failed, CaseStatus::PaymentFailed);
        assert_eq!(
            next_state(failed, CaseAction::RetryPayment),
            Some(CaseStatus::PaymentPending)
        );
        assert_eq!(next_state(failed, CaseAction::PaymentConfirmed), None);
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        assert_eq!(next_state(CaseStatus::Draft, CaseAction::AcceptOffer), None);
        assert_eq!(next_state(CaseStatus::Closed, CaseAction::Resume), None);
        assert_eq!(next_state(CaseStatus::Published, CaseAction::Publish), None);
        assert_eq!(
            next_state(CaseStatus::PaymentPending, CaseAction::Close),
            None
        );
        assert_eq!(
            next_state(CaseStatus::UnderReview, CaseAction::AssignDirect),
            None
        );
    }

    #[test]
    fn test_closed_accepts_only_verify() {
        let actions = [
            CaseAction::Publish,
            CaseAction::ReceiveOffer,
            CaseAction::ReopenBidding,
            CaseAction::AssignDirect,
            CaseAction::DeclineAssignment,
            CaseAction::AcceptOffer,
            CaseAction::PaymentConfirmed,
            CaseAction::PaymentFailed,
            CaseAction::RetryPayment,
            CaseAction::Hold,
            CaseAction::Resume,
            CaseAction::Close,
        ];
        for action in actions {
            assert_eq!(next_state(CaseStatus::Closed, action), None, "{}", action);
        }
    }

    #[test]
    fn test_manual_action_lookup() {
        assert_eq!(
            manual_action_for(CaseStatus::InProgress, CaseStatus::OnHold),
            Some(CaseAction::Hold)
        );
        assert_eq!(
            manual_action_for(CaseStatus::OnHold, CaseStatus::Closed),
            Some(CaseAction::Close)
        );
        // payment-driven moves are never manual
        assert_eq!(
            manual_action_for(CaseStatus::PaymentPending, CaseStatus::InProgress),
            None
        );
        assert_eq!(
            manual_action_for(CaseStatus::Draft, CaseStatus::Published),
            None
        );
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in CaseStatus::ALL {
            assert_eq!(status.as_str().parse::<CaseStatus>().unwrap(), status);
        }
        assert_eq!(
            "payment_received".parse::<CaseStatus>(),
            Err("Invalid case status: payment_received".to_string())
        );
    }

    #[test]
    fn test_requires_provider() {
        assert!(!CaseStatus::Draft.requires_provider());
        assert!(!CaseStatus::Published.requires_provider());
        assert!(!CaseStatus::UnderReview.requires_provider());
        assert!(CaseStatus::PendingApproval.requires_provider());
        assert!(CaseStatus::PaymentPending.requires_provider());
        assert!(CaseStatus::Closed.requires_provider());
    }
}
