//! Offer FSM State Definitions
//!
//! ```text
//! SUBMITTED ─▶ ACCEPTED ─▶ FUNDED
//!     ├──────▶ REJECTED
//!     ├──────▶ EXPIRED
//!     └──────▶ WITHDRAWN
//! ```
//!
//! Offers only move forward. Terminal: REJECTED, EXPIRED, WITHDRAWN, FUNDED.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferStatus {
    Submitted,
    Accepted,
    Rejected,
    Expired,
    Withdrawn,
    Funded,
}

impl OfferStatus {
    pub const ALL: [OfferStatus; 6] = [
        OfferStatus::Submitted,
        OfferStatus::Accepted,
        OfferStatus::Rejected,
        OfferStatus::Expired,
        OfferStatus::Withdrawn,
        OfferStatus::Funded,
    ];

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OfferStatus::Rejected
                | OfferStatus::Expired
                | OfferStatus::Withdrawn
                | OfferStatus::Funded
        )
    }

    /// Counts against the per-case cap.
    #[inline]
    pub fn is_active(&self) -> bool {
        *self == OfferStatus::Submitted
    }

    /// A provider whose offer ended this way may bid again on the same case.
    #[inline]
    pub fn allows_resubmission(&self) -> bool {
        matches!(self, OfferStatus::Withdrawn | OfferStatus::Expired)
    }

    pub fn can_transition_to(&self, next: OfferStatus) -> bool {
        matches!(
            (self, next),
            (
                OfferStatus::Submitted,
                OfferStatus::Accepted
                    | OfferStatus::Rejected
                    | OfferStatus::Expired
                    | OfferStatus::Withdrawn
            ) | (OfferStatus::Accepted, OfferStatus::Funded)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Submitted => "SUBMITTED",
            OfferStatus::Accepted => "ACCEPTED",
            OfferStatus::Rejected => "REJECTED",
            OfferStatus::Expired => "EXPIRED",
            OfferStatus::Withdrawn => "WITHDRAWN",
            OfferStatus::Funded => "FUNDED",
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let canonical = s.trim().to_uppercase();
        OfferStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == canonical)
            .ok_or_else(|| format!("Invalid offer status: {}", s))
    }
}
