//! Form persistence: keeps partially filled forms alive across reloads.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::keys::DraftKey;
use crate::error::StorageError;

/// Fields never written to storage unless overridden.
pub const DEFAULT_EXCLUDED_FIELDS: &[&str] = &["password", "confirm_password", "confirmPassword"];

/// Key/value backend for drafts. Values are JSON objects.
#[async_trait]
pub trait DraftStorage: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<Value>, StorageError>;

    async fn write(&self, key: &str, value: &Value) -> Result<(), StorageError>;

    /// Returns whether an entry existed.
    async fn remove(&self, key: &str) -> Result<bool, StorageError>;
}

/// One form's draft: in-memory field values plus their persisted copy.
///
/// Every [`update`](Self::update) is flushed before it returns once the
/// store is bound to a key by [`load`](Self::load) or [`save`](Self::save).
/// Excluded fields stay in memory but are stripped on every write.
pub struct FormPersistenceStore {
    storage: Arc<dyn DraftStorage>,
    product: String,
    excluded: BTreeSet<String>,
    initial: Map<String, Value>,
    key: Option<DraftKey>,
    data: Map<String, Value>,
    dirty: bool,
}

impl FormPersistenceStore {
    pub fn new(storage: Arc<dyn DraftStorage>, product: impl Into<String>) -> Self {
        Self {
            storage,
            product: product.into(),
            excluded: default_excluded(),
            initial: Map::new(),
            key: None,
            data: Map::new(),
            dirty: false,
        }
    }

    /// Replace the exclusion list.
    pub fn with_excluded_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Shape the form starts from and returns to on `clear`.
    pub fn with_initial(mut self, initial: Map<String, Value>) -> Self {
        self.data = initial.clone();
        self.initial = initial;
        self
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn key(&self) -> Option<DraftKey> {
        self.key
    }

    /// Bind to `key` and restore whatever was saved under it.
    ///
    /// Returns whether a draft was found. An entry that is not a JSON
    /// object is dropped and the form starts from its initial shape.
    pub async fn load(&mut self, key: DraftKey) -> Result<bool, StorageError> {
        let storage_key = key.storage_key(&self.product);
        let stored = self.storage.read(&storage_key).await?;
        self.key = Some(key);
        self.dirty = false;
        self.data = self.initial.clone();

        match stored {
            Some(Value::Object(fields)) => {
                debug!(key = %storage_key, fields = fields.len(), "Draft restored");
                self.data.extend(fields);
                Ok(true)
            }
            Some(_) => {
                warn!(key = %storage_key, "Discarding malformed draft");
                self.storage.remove(&storage_key).await?;
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Merge `partial` into the form and flush it if a key is bound.
    pub async fn update(&mut self, partial: Map<String, Value>) -> Result<(), StorageError> {
        if partial.is_empty() {
            return Ok(());
        }
        self.data.extend(partial);
        self.dirty = true;
        match self.key {
            Some(key) => self.save(key).await,
            None => Ok(()),
        }
    }

    /// Write the form under `key`, minus excluded fields, and bind to it.
    pub async fn save(&mut self, key: DraftKey) -> Result<(), StorageError> {
        let storage_key = key.storage_key(&self.product);
        self.storage
            .write(&storage_key, &Value::Object(self.persisted()))
            .await?;
        self.key = Some(key);
        self.dirty = false;
        Ok(())
    }

    /// Remove the saved draft and reset the form to its initial shape.
    pub async fn clear(&mut self, key: DraftKey) -> Result<bool, StorageError> {
        let existed = self.storage.remove(&key.storage_key(&self.product)).await?;
        self.data = self.initial.clone();
        self.dirty = false;
        if self.key == Some(key) {
            self.key = None;
        }
        Ok(existed)
    }

    /// What a write would store right now.
    pub fn persisted(&self) -> Map<String, Value> {
        strip_excluded(&self.data, &self.excluded)
    }
}

/// Copy of `fields` without any excluded names.
pub fn strip_excluded(fields: &Map<String, Value>, excluded: &BTreeSet<String>) -> Map<String, Value> {
    fields
        .iter()
        .filter(|(name, _)| !excluded.contains(name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// The default exclusion list as a set.
pub fn default_excluded() -> BTreeSet<String> {
    DEFAULT_EXCLUDED_FIELDS.iter().map(|f| f.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::auth::model::UserType;
    use crate::store::memory::MemoryDraftStorage;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn step(n: u32) -> DraftKey {
        DraftKey::onboarding(UserType::Mentor, n)
    }

    #[tokio::test]
    async fn reload_restores_everything_but_excluded_fields() {
        let storage = MemoryDraftStorage::new();
        let mut form = FormPersistenceStore::new(storage.clone(), "mentorgate");
        form.load(step(1)).await.unwrap();
        form.update(fields(json!({
            "full_name": "Ada",
            "expertise": ["rust", "databases"],
            "password": "hunter2"
        })))
        .await
        .unwrap();
        assert!(!form.is_dirty());

        // In-memory state keeps the secret for this session.
        assert_eq!(form.data()["password"], "hunter2");

        let mut reloaded = FormPersistenceStore::new(storage.clone(), "mentorgate");
        assert!(reloaded.load(step(1)).await.unwrap());
        assert_eq!(reloaded.data()["full_name"], "Ada");
        assert_eq!(reloaded.data()["expertise"], json!(["rust", "databases"]));
        assert!(!reloaded.data().contains_key("password"));

        let raw = storage
            .read("mentorgate-onboarding-mentor-step-1")
            .await
            .unwrap()
            .unwrap();
        assert!(raw.get("password").is_none());
    }

    #[tokio::test]
    async fn update_without_key_stays_dirty_until_saved() {
        let storage = MemoryDraftStorage::new();
        let mut form = FormPersistenceStore::new(storage.clone(), "mentorgate");
        form.update(fields(json!({"email": "a@b.c"}))).await.unwrap();
        assert!(form.is_dirty());
        assert!(storage.is_empty().await);

        form.save(DraftKey::Signup).await.unwrap();
        assert!(!form.is_dirty());
        assert_eq!(
            storage.read("mentorgate-signup-data").await.unwrap(),
            Some(json!({"email": "a@b.c"}))
        );
    }

    #[tokio::test]
    async fn clear_removes_entry_and_resets_to_initial() {
        let storage = MemoryDraftStorage::new();
        let initial = fields(json!({"bio": ""}));
        let mut form =
            FormPersistenceStore::new(storage.clone(), "mentorgate").with_initial(initial.clone());
        form.load(step(2)).await.unwrap();
        form.update(fields(json!({"bio": "hello"}))).await.unwrap();

        assert!(form.clear(step(2)).await.unwrap());
        assert_eq!(form.data(), &initial);
        assert_eq!(form.key(), None);
        assert!(storage.is_empty().await);
        assert!(!form.clear(step(2)).await.unwrap());
    }

    #[tokio::test]
    async fn steps_and_roles_are_isolated() {
        let storage = MemoryDraftStorage::new();
        let mut form = FormPersistenceStore::new(storage.clone(), "mentorgate");
        form.load(step(1)).await.unwrap();
        form.update(fields(json!({"a": 1}))).await.unwrap();

        let mut other = FormPersistenceStore::new(storage.clone(), "mentorgate");
        assert!(!other.load(step(2)).await.unwrap());
        assert!(!other
            .load(DraftKey::onboarding(UserType::Mentee, 1))
            .await
            .unwrap());
        assert!(other.data().is_empty());
    }

    #[tokio::test]
    async fn malformed_draft_is_discarded() {
        let storage = MemoryDraftStorage::new();
        storage
            .write("mentorgate-signup-data", &json!("garbage"))
            .await
            .unwrap();

        let mut form = FormPersistenceStore::new(storage.clone(), "mentorgate");
        assert!(!form.load(DraftKey::Signup).await.unwrap());
        assert!(form.data().is_empty());
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn custom_exclusions() {
        let storage = MemoryDraftStorage::new();
        let mut form = FormPersistenceStore::new(storage.clone(), "mentorgate")
            .with_excluded_fields(["ssn"]);
        form.load(DraftKey::Signup).await.unwrap();
        form.update(fields(json!({"ssn": "123", "password": "kept"})))
            .await
            .unwrap();
        assert_eq!(form.persisted(), fields(json!({"password": "kept"})));
    }
}
