#![allow(dead_code)]

use std::sync::Arc;

use casebid::case::{Case, CaseOrchestrator, NewCase};
use casebid::core_types::{Actor, Category, Role, UserId};
use casebid::offer::OfferPolicy;
use casebid::payment::MockGateway;
use casebid::ports::{
    ConnectionManager, InMemoryDirectory, LogNotifier, Ports, UserProfile, WsBroadcaster,
};
use casebid::store::MemoryStore;

pub const OWNER: u64 = 1;
pub const OTHER_CLIENT: u64 = 2;
/// Family + Property
pub const L1: u64 = 10;
/// Family
pub const L2: u64 = 11;
/// Criminal only
pub const L3: u64 = 12;
pub const ADMIN: u64 = 99;

pub struct Env {
    pub orchestrator: Arc<CaseOrchestrator>,
    pub gateway: Arc<MockGateway>,
    pub store: Arc<MemoryStore>,
    pub directory: Arc<InMemoryDirectory>,
}

fn profile(id: u64, role: Role, specializations: Vec<Category>) -> UserProfile {
    UserProfile {
        id: UserId(id),
        role,
        specializations,
        email: None,
    }
}

pub fn env() -> Env {
    env_with_policy(OfferPolicy::default())
}

pub fn env_with_policy(policy: OfferPolicy) -> Env {
    let mut users = vec![
        profile(OWNER, Role::Client, vec![]),
        profile(OTHER_CLIENT, Role::Client, vec![]),
        profile(L1, Role::Provider, vec![Category::Family, Category::Property]),
        profile(L2, Role::Provider, vec![Category::Family]),
        profile(L3, Role::Provider, vec![Category::Criminal]),
        profile(ADMIN, Role::Admin, vec![]),
    ];
    // Bench of family-law providers for cap tests
    users.extend((20..30).map(|id| profile(id, Role::Provider, vec![Category::Family])));

    let directory = Arc::new(InMemoryDirectory::with_users(users));
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(MockGateway::with_test_secrets());
    let ports = Ports {
        directory: directory.clone(),
        notifier: Arc::new(LogNotifier),
        broadcast: Arc::new(WsBroadcaster::new(Arc::new(ConnectionManager::new()))),
    };
    let orchestrator = Arc::new(CaseOrchestrator::assemble(
        store.clone(),
        ports,
        gateway.clone(),
        "INR",
        policy,
    ));
    Env {
        orchestrator,
        gateway,
        store,
        directory,
    }
}

pub fn client(id: u64) -> Actor {
    Actor::new(UserId(id), Role::Client)
}

pub fn provider(id: u64) -> Actor {
    let specializations = match id {
        L1 => vec![Category::Family, Category::Property],
        L3 => vec![Category::Criminal],
        _ => vec![Category::Family],
    };
    Actor::provider(UserId(id), specializations)
}

pub fn admin() -> Actor {
    Actor::new(UserId(ADMIN), Role::Admin)
}

/// A PUBLISHED family-law case owned by `OWNER`.
pub async fn published_case(env: &Env) -> Case {
    let owner = client(OWNER);
    let case = env
        .orchestrator
        .create_case(
            &owner,
            NewCase {
                title: "Custody arrangement".into(),
                description: "Shared custody after separation".into(),
                category: "family law".into(),
            },
        )
        .await
        .unwrap();
    env.orchestrator.publish(case.id, &owner).await.unwrap()
}
