//! User directory: identity, role and provider specializations.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::core_types::{Actor, Category, Role, UserId};
use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub role: Role,
    #[serde(default)]
    pub specializations: Vec<Category>,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserProfile {
    pub fn to_actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
            specializations: self.specializations.clone(),
        }
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn resolve(&self, id: UserId) -> Result<Option<UserProfile>, CoreError>;
}

/// Directory held in memory, seeded from configuration.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: DashMap<UserId, UserProfile>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserProfile>) -> Self {
        let directory = Self::new();
        for user in users {
            directory.insert(user);
        }
        directory
    }

    pub fn insert(&self, profile: UserProfile) {
        self.users.insert(profile.id, profile);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn resolve(&self, id: UserId) -> Result<Option<UserProfile>, CoreError> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }
}
