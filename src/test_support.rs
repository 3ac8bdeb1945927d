//! Shared fixtures for unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::audit::AuditTrail;
use crate::case::{Case, CaseStatus};
use crate::core_types::{Actor, CaseId, Category, Role, UserId};
use crate::error::CoreError;
use crate::offer::Offer;
use crate::ports::{
    BroadcastPort, DomainEvent, InMemoryDirectory, Notification, NotificationPort, Ports,
    UserProfile,
};
use crate::store::{MemoryStore, Store};

pub const OWNER: UserId = UserId(1);
pub const ASSIGNED: UserId = UserId(10);

pub fn client(id: u64) -> Actor {
    Actor::new(UserId(id), Role::Client)
}

pub fn provider(id: u64, category: Category) -> Actor {
    Actor::provider(UserId(id), vec![category])
}

pub fn admin() -> Actor {
    Actor::new(UserId(99), Role::Admin)
}

#[derive(Default)]
pub struct RecordingBroadcast {
    pub events: Mutex<Vec<DomainEvent>>,
}

impl BroadcastPort for RecordingBroadcast {
    fn publish(&self, event: DomainEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl NotificationPort for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), CoreError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub audit: AuditTrail,
    pub directory: Arc<InMemoryDirectory>,
    pub broadcast: Arc<RecordingBroadcast>,
    pub notifier: Arc<RecordingNotifier>,
    pub ports: Ports,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(InMemoryDirectory::new());
        directory.insert(UserProfile {
            id: OWNER,
            role: Role::Client,
            specializations: vec![],
            email: None,
        });
        for id in 10..20 {
            directory.insert(UserProfile {
                id: UserId(id),
                role: Role::Provider,
                specializations: Category::ALL.to_vec(),
                email: None,
            });
        }
        let broadcast = Arc::new(RecordingBroadcast::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let ports = Ports {
            directory: directory.clone(),
            notifier: notifier.clone(),
            broadcast: broadcast.clone(),
        };
        Self {
            audit: AuditTrail::new(store.clone()),
            store,
            directory,
            broadcast,
            notifier,
            ports,
        }
    }

    /// Insert a case owned by `OWNER`, assigned to `ASSIGNED` when the status
    /// requires a provider.
    pub async fn seed_case(&self, status: CaseStatus, category: Category) -> Case {
        let mut case = Case::new(
            OWNER,
            "Property partition".into(),
            "Ancestral land split among heirs".into(),
            category,
            Utc::now(),
        );
        case.status = status;
        if status.requires_provider() {
            case.assigned_provider_id = Some(ASSIGNED);
            case.agreed_fee = Some(Decimal::from(1000));
        }
        let mut tx = self.store.begin().await.unwrap();
        tx.insert_case(&case).await.unwrap();
        tx.commit().await.unwrap();
        case
    }

    pub async fn seed_offers(&self, offers: &[Offer]) {
        let mut tx = self.store.begin().await.unwrap();
        for offer in offers {
            tx.lock_case(offer.case_id).await.unwrap();
            tx.insert_offer(offer).await.unwrap();
        }
        tx.commit().await.unwrap();
    }

    pub async fn case(&self, id: CaseId) -> Case {
        self.store.case(id).await.unwrap().unwrap()
    }

    pub async fn timeline_len(&self, id: CaseId) -> usize {
        self.audit.timeline(id).await.unwrap().len()
    }
}
