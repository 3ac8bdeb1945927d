//! In-process store.
//!
//! Row locks are per-case `tokio::sync::Mutex` guards held by the
//! transaction. Writes are staged in the transaction and applied on commit,
//! so a dropped transaction leaves no trace.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Store, StoreTx};
use crate::audit::AuditEvent;
use crate::case::Case;
use crate::core_types::{CaseId, OfferId, PaymentId, UserId};
use crate::error::CoreError;
use crate::offer::Offer;
use crate::payment::Payment;

#[derive(Default)]
struct Tables {
    cases: DashMap<CaseId, Case>,
    offers: DashMap<OfferId, Offer>,
    payments: DashMap<PaymentId, Payment>,
    /// gateway_order_id -> payment
    orders: DashMap<String, PaymentId>,
    audit: DashMap<CaseId, Vec<AuditEvent>>,
    completed: DashMap<UserId, u64>,
    locks: DashMap<CaseId, Arc<Mutex<()>>>,
    fail_audit: AtomicBool,
}

impl Tables {
    fn lock_for(&self, id: CaseId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// DashMap-backed store used by tests and single-node deployments.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every audit append fail (for exercising the best-effort path).
    pub fn fail_audit_writes(&self, fail: bool) {
        self.tables.fail_audit.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn case(&self, id: CaseId) -> Result<Option<Case>, CoreError> {
        Ok(self.tables.cases.get(&id).map(|c| c.clone()))
    }

    async fn offer(&self, id: OfferId) -> Result<Option<Offer>, CoreError> {
        Ok(self.tables.offers.get(&id).map(|o| o.clone()))
    }

    async fn offers_for_case(&self, case_id: CaseId) -> Result<Vec<Offer>, CoreError> {
        let mut offers: Vec<Offer> = self
            .tables
            .offers
            .iter()
            .filter(|o| o.case_id == case_id)
            .map(|o| o.clone())
            .collect();
        offers.sort_by_key(|o| o.created_at);
        Ok(offers)
    }

    async fn payment_by_order(&self, order_id: &str) -> Result<Option<Payment>, CoreError> {
        let Some(id) = self.tables.orders.get(order_id).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.tables.payments.get(&id).map(|p| p.clone()))
    }

    async fn cases_with_expired_offers(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<CaseId>, CoreError> {
        let ids: HashSet<CaseId> = self
            .tables
            .offers
            .iter()
            .filter(|o| o.is_expired_at(now))
            .map(|o| o.case_id)
            .collect();
        let mut ids: Vec<CaseId> = ids.into_iter().collect();
        ids.sort();
        Ok(ids)
    }

    async fn completed_cases(&self, provider: UserId) -> Result<u64, CoreError> {
        Ok(self.tables.completed.get(&provider).map(|n| *n).unwrap_or(0))
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<(), CoreError> {
        if self.tables.fail_audit.load(Ordering::SeqCst) {
            return Err(CoreError::Persistence("audit log unavailable".into()));
        }
        self.tables
            .audit
            .entry(event.case_id)
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn audit_events(&self, case_id: CaseId) -> Result<Vec<AuditEvent>, CoreError> {
        Ok(self
            .tables
            .audit
            .get(&case_id)
            .map(|events| events.clone())
            .unwrap_or_default())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, CoreError> {
        Ok(Box::new(MemoryTx {
            tables: self.tables.clone(),
            guards: HashMap::new(),
            cases: HashMap::new(),
            offers: HashMap::new(),
            deleted_offers: HashSet::new(),
            payments: HashMap::new(),
            completed: Vec::new(),
        }))
    }
}

struct MemoryTx {
    tables: Arc<Tables>,
    guards: HashMap<CaseId, OwnedMutexGuard<()>>,
    cases: HashMap<CaseId, Case>,
    offers: HashMap<OfferId, Offer>,
    deleted_offers: HashSet<OfferId>,
    payments: HashMap<PaymentId, Payment>,
    completed: Vec<UserId>,
}

impl MemoryTx {
    fn current_offer(&self, id: OfferId) -> Option<Offer> {
        if self.deleted_offers.contains(&id) {
            return None;
        }
        self.offers
            .get(&id)
            .cloned()
            .or_else(|| self.tables.offers.get(&id).map(|o| o.clone()))
    }

    fn current_payment(&self, id: PaymentId) -> Option<Payment> {
        self.payments
            .get(&id)
            .cloned()
            .or_else(|| self.tables.payments.get(&id).map(|p| p.clone()))
    }

    fn case_offers(&self, case_id: CaseId) -> Vec<Offer> {
        let mut ids: HashSet<OfferId> = self
            .tables
            .offers
            .iter()
            .filter(|o| o.case_id == case_id)
            .map(|o| o.id)
            .collect();
        ids.extend(
            self.offers
                .values()
                .filter(|o| o.case_id == case_id)
                .map(|o| o.id),
        );
        let mut offers: Vec<Offer> = ids
            .into_iter()
            .filter_map(|id| self.current_offer(id))
            .collect();
        offers.sort_by_key(|o| o.created_at);
        offers
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_case(&mut self, id: CaseId) -> Result<Option<Case>, CoreError> {
        if !self.guards.contains_key(&id) {
            let guard = self.tables.lock_for(id).lock_owned().await;
            self.guards.insert(id, guard);
        }
        Ok(self
            .cases
            .get(&id)
            .cloned()
            .or_else(|| self.tables.cases.get(&id).map(|c| c.clone())))
    }

    async fn insert_case(&mut self, case: &Case) -> Result<(), CoreError> {
        if self.tables.cases.contains_key(&case.id) || self.cases.contains_key(&case.id) {
            return Err(CoreError::conflict(format!("Case {} already exists", case.id)));
        }
        self.cases.insert(case.id, case.clone());
        Ok(())
    }

    async fn update_case(&mut self, case: &Case) -> Result<(), CoreError> {
        self.cases.insert(case.id, case.clone());
        Ok(())
    }

    async fn offers_for_case(&mut self, case_id: CaseId) -> Result<Vec<Offer>, CoreError> {
        Ok(self.case_offers(case_id))
    }

    async fn offer(&mut self, id: OfferId) -> Result<Option<Offer>, CoreError> {
        Ok(self.current_offer(id))
    }

    async fn insert_offer(&mut self, offer: &Offer) -> Result<(), CoreError> {
        let taken = self
            .case_offers(offer.case_id)
            .iter()
            .any(|o| o.provider_id == offer.provider_id);
        if taken {
            return Err(CoreError::conflict(format!(
                "Provider {} already has an offer on case {}",
                offer.provider_id, offer.case_id
            )));
        }
        self.deleted_offers.remove(&offer.id);
        self.offers.insert(offer.id, offer.clone());
        Ok(())
    }

    async fn update_offer(&mut self, offer: &Offer) -> Result<(), CoreError> {
        self.offers.insert(offer.id, offer.clone());
        Ok(())
    }

    async fn delete_offer(&mut self, id: OfferId) -> Result<(), CoreError> {
        self.offers.remove(&id);
        self.deleted_offers.insert(id);
        Ok(())
    }

    async fn payments_for_case(&mut self, case_id: CaseId) -> Result<Vec<Payment>, CoreError> {
        let mut ids: HashSet<PaymentId> = self
            .tables
            .payments
            .iter()
            .filter(|p| p.case_id == case_id)
            .map(|p| p.id)
            .collect();
        ids.extend(
            self.payments
                .values()
                .filter(|p| p.case_id == case_id)
                .map(|p| p.id),
        );
        let mut payments: Vec<Payment> = ids
            .into_iter()
            .filter_map(|id| self.current_payment(id))
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn payment_by_order(&mut self, order_id: &str) -> Result<Option<Payment>, CoreError> {
        if let Some(p) = self
            .payments
            .values()
            .find(|p| p.gateway_order_id == order_id)
        {
            return Ok(Some(p.clone()));
        }
        let Some(id) = self.tables.orders.get(order_id).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.current_payment(id))
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), CoreError> {
        let staged = self
            .payments
            .values()
            .any(|p| p.gateway_order_id == payment.gateway_order_id);
        if staged || self.tables.orders.contains_key(&payment.gateway_order_id) {
            return Err(CoreError::conflict(format!(
                "Gateway order {} already recorded",
                payment.gateway_order_id
            )));
        }
        self.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), CoreError> {
        self.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn increment_completed_cases(&mut self, provider: UserId) -> Result<(), CoreError> {
        self.completed.push(provider);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), CoreError> {
        let MemoryTx {
            tables,
            guards,
            cases,
            offers,
            deleted_offers,
            payments,
            completed,
        } = *self;

        for (id, case) in cases {
            tables.cases.insert(id, case);
        }
        for id in deleted_offers {
            tables.offers.remove(&id);
        }
        for (id, offer) in offers {
            tables.offers.insert(id, offer);
        }
        for (id, payment) in payments {
            tables.orders.insert(payment.gateway_order_id.clone(), id);
            tables.payments.insert(id, payment);
        }
        for provider in completed {
            *tables.completed.entry(provider).or_insert(0) += 1;
        }

        drop(guards);
        Ok(())
    }
}
