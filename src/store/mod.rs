//! Storage abstraction
//!
//! `Store` serves plain reads and the audit log. Every mutation goes through
//! a `StoreTx`: the caller locks the case row first (`lock_case`), reads and
//! stages writes, then commits. Dropping a transaction without committing
//! rolls it back.
//!
//! Two transactions that lock the same case are serialized; transactions on
//! different cases never wait on each other.

mod memory;
mod postgres;
pub mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::audit::AuditEvent;
use crate::case::Case;
use crate::core_types::{Actor, CaseId, OfferId, UserId};
use crate::error::CoreError;
use crate::offer::Offer;
use crate::payment::Payment;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn case(&self, id: CaseId) -> Result<Option<Case>, CoreError>;

    async fn offer(&self, id: OfferId) -> Result<Option<Offer>, CoreError>;

    async fn offers_for_case(&self, case_id: CaseId) -> Result<Vec<Offer>, CoreError>;

    async fn payment_by_order(&self, order_id: &str) -> Result<Option<Payment>, CoreError>;

    /// Cases holding at least one SUBMITTED offer with `expires_at < now`.
    async fn cases_with_expired_offers(&self, now: DateTime<Utc>)
    -> Result<Vec<CaseId>, CoreError>;

    async fn completed_cases(&self, provider: UserId) -> Result<u64, CoreError>;

    async fn append_audit(&self, event: &AuditEvent) -> Result<(), CoreError>;

    /// Unordered; the audit trail sorts.
    async fn audit_events(&self, case_id: CaseId) -> Result<Vec<AuditEvent>, CoreError>;

    async fn begin(&self) -> Result<Box<dyn StoreTx>, CoreError>;
}

#[async_trait]
pub trait StoreTx: Send {
    /// Read a case and hold its row lock until commit or drop.
    async fn lock_case(&mut self, id: CaseId) -> Result<Option<Case>, CoreError>;

    async fn insert_case(&mut self, case: &Case) -> Result<(), CoreError>;

    async fn update_case(&mut self, case: &Case) -> Result<(), CoreError>;

    async fn offers_for_case(&mut self, case_id: CaseId) -> Result<Vec<Offer>, CoreError>;

    async fn offer(&mut self, id: OfferId) -> Result<Option<Offer>, CoreError>;

    /// Fails with `Conflict` if the provider already has an offer row on the case.
    async fn insert_offer(&mut self, offer: &Offer) -> Result<(), CoreError>;

    async fn update_offer(&mut self, offer: &Offer) -> Result<(), CoreError>;

    async fn delete_offer(&mut self, id: OfferId) -> Result<(), CoreError>;

    async fn payments_for_case(&mut self, case_id: CaseId) -> Result<Vec<Payment>, CoreError>;

    async fn payment_by_order(&mut self, order_id: &str) -> Result<Option<Payment>, CoreError>;

    /// Fails with `Conflict` if the gateway order id is already recorded.
    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), CoreError>;

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), CoreError>;

    async fn increment_completed_cases(&mut self, provider: UserId) -> Result<(), CoreError>;

    async fn commit(self: Box<Self>) -> Result<(), CoreError>;
}

/// Lock a case for mutation. Soft-deleted cases exist only for admins.
pub async fn lock_live_case(
    tx: &mut Box<dyn StoreTx>,
    case_id: CaseId,
    actor: &Actor,
) -> Result<Case, CoreError> {
    tx.lock_case(case_id)
        .await?
        .filter(|c| !c.deleted || actor.is_admin())
        .ok_or_else(|| CoreError::not_found("Case", case_id))
}
