//! In-memory implementations of the profile and draft stores.
//!
//! Used by tests and by embedders that have no durable backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::auth::model::{CanonicalProfile, RoleProfile, UserId, UserType};
use crate::auth::profile::ProfileStore;
use crate::drafts::store::DraftStorage;
use crate::error::{ProfileError, StorageError};

/// Profile store backed by process memory.
#[derive(Default)]
pub struct MemoryProfileStore {
    canonical: RwLock<HashMap<UserId, CanonicalProfile>>,
    roles: RwLock<HashMap<(UserId, UserType), RoleProfile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn canonical_profile(
        &self,
        user_id: &UserId,
    ) -> Result<Option<CanonicalProfile>, ProfileError> {
        Ok(self.canonical.read().await.get(user_id).cloned())
    }

    async fn role_profile(
        &self,
        user_id: &UserId,
        role: UserType,
    ) -> Result<Option<RoleProfile>, ProfileError> {
        Ok(self
            .roles
            .read()
            .await
            .get(&(user_id.clone(), role))
            .cloned())
    }

    async fn save_canonical_profile(&self, profile: &CanonicalProfile) -> Result<(), ProfileError> {
        self.canonical
            .write()
            .await
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn save_role_profile(&self, profile: &RoleProfile) -> Result<(), ProfileError> {
        self.roles
            .write()
            .await
            .insert((profile.user_id.clone(), profile.role), profile.clone());
        Ok(())
    }
}

/// Draft storage backed by process memory.
#[derive(Default)]
pub struct MemoryDraftStorage {
    entries: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryDraftStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of stored drafts.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl DraftStorage for MemoryDraftStorage {
    async fn read(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &serde_json::Value) -> Result<(), StorageError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}
