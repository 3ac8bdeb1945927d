//! Case entity

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::state::{CaseAction, CaseStatus, next_state};
use crate::core_types::{CaseId, Category, UserId};
use crate::error::CoreError;

/// A unit of work posted by an owner seeking a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub owner_id: UserId,
    pub assigned_provider_id: Option<UserId>,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub status: CaseStatus,
    /// Set when an offer is accepted
    pub agreed_fee: Option<Decimal>,
    /// Soft-delete flag, orthogonal to status
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a single state-machine step, used for the audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub action: CaseAction,
    pub from: CaseStatus,
    pub to: CaseStatus,
}

impl Case {
    pub fn new(
        owner_id: UserId,
        title: String,
        description: String,
        category: Category,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CaseId::new(),
            owner_id,
            assigned_provider_id: None,
            title,
            description,
            category,
            status: CaseStatus::Draft,
            agreed_fee: None,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[inline]
    pub fn is_owner(&self, user: UserId) -> bool {
        self.owner_id == user
    }

    #[inline]
    pub fn is_assigned_to(&self, user: UserId) -> bool {
        self.assigned_provider_id == Some(user)
    }

    /// Apply an action through the transition table.
    ///
    /// Illegal transitions leave the case untouched and return `Conflict`.
    pub fn apply(&mut self, action: CaseAction, now: DateTime<Utc>) -> Result<Transition, CoreError> {
        let from = self.status;
        let to = next_state(from, action).ok_or_else(|| {
            CoreError::conflict(format!(
                "Case {} cannot {} from {}",
                self.id, action, from
            ))
        })?;
        self.status = to;
        self.updated_at = now;
        Ok(Transition { action, from, to })
    }

    /// `assigned_provider_id` is set iff the status requires a provider.
    pub fn assignment_consistent(&self) -> bool {
        self.status.requires_provider() == self.assigned_provider_id.is_some()
    }
}
