//! libSQL backend: durable `ProfileStore` and `DraftStorage`.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::auth::model::{CanonicalProfile, RoleProfile, UserId, UserType, VerificationStatus};
use crate::auth::profile::ProfileStore;
use crate::drafts::store::DraftStorage;
use crate::error::{DatabaseError, ProfileError, StorageError};
use crate::store::migrations;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;
        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    // ── Profiles ────────────────────────────────────────────────────

    async fn get_canonical(&self, user_id: &str) -> Result<Option<CanonicalProfile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, full_name, user_type, onboarding_step, onboarding_completed, updated_at
                 FROM profiles WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_canonical: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_canonical(&row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_canonical: {e}"))),
        }
    }

    async fn put_canonical(&self, profile: &CanonicalProfile) -> Result<(), DatabaseError> {
        let user_type = profile.user_type.map(|t| t.as_str().to_string());
        self.conn()
            .execute(
                "INSERT INTO profiles (user_id, full_name, user_type, onboarding_step, onboarding_completed, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (user_id) DO UPDATE SET
                    full_name = ?2, user_type = ?3, onboarding_step = ?4,
                    onboarding_completed = ?5, updated_at = ?6",
                params![
                    profile.user_id.as_str(),
                    profile.full_name.clone(),
                    user_type,
                    i64::from(profile.onboarding_step),
                    i64::from(profile.onboarding_completed),
                    profile.updated_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("put_canonical: {e}")))?;
        Ok(())
    }

    async fn get_role(
        &self,
        user_id: &str,
        role: UserType,
    ) -> Result<Option<RoleProfile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, role, onboarding_step, onboarding_completed, verification, data, updated_at
                 FROM role_profiles WHERE user_id = ?1 AND role = ?2",
                params![user_id, role.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_role: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_role(&row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_role: {e}"))),
        }
    }

    async fn put_role(&self, profile: &RoleProfile) -> Result<(), DatabaseError> {
        let data = serde_json::to_string(&profile.data)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO role_profiles (user_id, role, onboarding_step, onboarding_completed, verification, data, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (user_id, role) DO UPDATE SET
                    onboarding_step = ?3, onboarding_completed = ?4,
                    verification = ?5, data = ?6, updated_at = ?7",
                params![
                    profile.user_id.as_str(),
                    profile.role.as_str(),
                    i64::from(profile.onboarding_step),
                    i64::from(profile.onboarding_completed),
                    enum_to_str(&profile.verification)?,
                    data,
                    profile.updated_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("put_role: {e}")))?;
        Ok(())
    }

    // ── Drafts ──────────────────────────────────────────────────────

    async fn get_draft(&self, key: &str) -> Result<Option<serde_json::Value>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT value FROM drafts WHERE key = ?1", params![key])
            .await
            .map_err(|e| DatabaseError::Query(format!("get_draft: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value_str: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_draft: {e}")))?;
                serde_json::from_str(&value_str)
                    .map(Some)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_draft: {e}"))),
        }
    }

    async fn put_draft(&self, key: &str, value: &serde_json::Value) -> Result<(), DatabaseError> {
        let value_str = serde_json::to_string(value)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO drafts (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key) DO UPDATE SET value = ?2, updated_at = ?3",
                params![key, value_str, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("put_draft: {e}")))?;
        Ok(())
    }

    async fn delete_draft(&self, key: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute("DELETE FROM drafts WHERE key = ?1", params![key])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_draft: {e}")))?;
        Ok(count > 0)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Serialized name of a unit enum variant.
fn enum_to_str<T: Serialize>(value: &T) -> Result<String, DatabaseError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => Ok(s),
        Ok(other) => Err(DatabaseError::Serialization(format!(
            "expected a string variant, got {other}"
        ))),
        Err(e) => Err(DatabaseError::Serialization(e.to_string())),
    }
}

fn str_to_enum<T: DeserializeOwned>(s: &str) -> Result<T, DatabaseError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|e| DatabaseError::Serialization(format!("{s:?}: {e}")))
}

fn to_step(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn row_to_canonical(row: &libsql::Row) -> Result<CanonicalProfile, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("row_to_canonical: {e}"));
    let user_id: String = row.get(0).map_err(read)?;
    let full_name: Option<String> = row.get(1).ok();
    let step: i64 = row.get(3).unwrap_or(0);
    let completed: i64 = row.get(4).unwrap_or(0);
    let updated_str: String = row.get(5).map_err(read)?;

    let user_type = match row.get_value(2).map_err(read)? {
        libsql::Value::Null => None,
        libsql::Value::Text(s) => Some(
            UserType::parse(&s)
                .ok_or_else(|| DatabaseError::Serialization(format!("unknown role {s:?}")))?,
        ),
        other => {
            return Err(DatabaseError::Serialization(format!(
                "unexpected user_type value {other:?}"
            )));
        }
    };

    Ok(CanonicalProfile {
        user_id: UserId::new(user_id),
        full_name,
        user_type,
        onboarding_step: to_step(step),
        onboarding_completed: completed != 0,
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_role(row: &libsql::Row) -> Result<RoleProfile, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("row_to_role: {e}"));
    let user_id: String = row.get(0).map_err(read)?;
    let role_str: String = row.get(1).map_err(read)?;
    let step: i64 = row.get(2).unwrap_or(0);
    let completed: i64 = row.get(3).unwrap_or(0);
    let verification_str: String = row.get(4).map_err(read)?;
    let data_str: String = row.get(5).unwrap_or_else(|_| "{}".to_string());
    let updated_str: String = row.get(6).map_err(read)?;

    let role = UserType::parse(&role_str)
        .ok_or_else(|| DatabaseError::Serialization(format!("unknown role {role_str:?}")))?;
    let verification: VerificationStatus = str_to_enum(&verification_str)?;
    let data = serde_json::from_str(&data_str)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

    Ok(RoleProfile {
        user_id: UserId::new(user_id),
        role,
        onboarding_step: to_step(step),
        onboarding_completed: completed != 0,
        verification,
        data,
        updated_at: parse_datetime(&updated_str),
    })
}

#[async_trait]
impl ProfileStore for LibSqlBackend {
    async fn canonical_profile(
        &self,
        user_id: &UserId,
    ) -> Result<Option<CanonicalProfile>, ProfileError> {
        self.get_canonical(user_id.as_str())
            .await
            .map_err(|e| ProfileError::FetchFailed {
                user_id: user_id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn role_profile(
        &self,
        user_id: &UserId,
        role: UserType,
    ) -> Result<Option<RoleProfile>, ProfileError> {
        self.get_role(user_id.as_str(), role)
            .await
            .map_err(|e| ProfileError::FetchFailed {
                user_id: user_id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn save_canonical_profile(&self, profile: &CanonicalProfile) -> Result<(), ProfileError> {
        self.put_canonical(profile)
            .await
            .map_err(|e| ProfileError::WriteFailed {
                user_id: profile.user_id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn save_role_profile(&self, profile: &RoleProfile) -> Result<(), ProfileError> {
        self.put_role(profile)
            .await
            .map_err(|e| ProfileError::WriteFailed {
                user_id: profile.user_id.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl DraftStorage for LibSqlBackend {
    async fn read(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        Ok(self.get_draft(key).await?)
    }

    async fn write(&self, key: &str, value: &serde_json::Value) -> Result<(), StorageError> {
        if !value.is_object() {
            return Err(StorageError::NotAnObject {
                key: key.to_string(),
            });
        }
        Ok(self.put_draft(key, value).await?)
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.delete_draft(key).await?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    // ── Profile tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn canonical_profile_round_trip() {
        let db = test_db().await;
        let user = UserId::new("u1");
        assert!(db.canonical_profile(&user).await.unwrap().is_none());

        let mut profile = CanonicalProfile::new(user.clone());
        db.save_canonical_profile(&profile).await.unwrap();
        let fetched = db.canonical_profile(&user).await.unwrap().unwrap();
        assert_eq!(fetched.user_type, None);
        assert_eq!(fetched.full_name, None);

        profile.user_type = Some(UserType::Mentor);
        profile.full_name = Some("Ada".into());
        profile.onboarding_step = 2;
        db.save_canonical_profile(&profile).await.unwrap();

        let fetched = db.canonical_profile(&user).await.unwrap().unwrap();
        assert_eq!(fetched.user_type, Some(UserType::Mentor));
        assert_eq!(fetched.full_name.as_deref(), Some("Ada"));
        assert_eq!(fetched.onboarding_step, 2);
        assert!(!fetched.onboarding_completed);
    }

    #[tokio::test]
    async fn unknown_canonical_role_is_a_fetch_error() {
        let db = test_db().await;
        db.conn()
            .execute(
                "INSERT INTO profiles (user_id, user_type, updated_at) VALUES (?1, ?2, ?3)",
                params!["u1", "admin", Utc::now().to_rfc3339()],
            )
            .await
            .unwrap();

        let err = db.canonical_profile(&UserId::new("u1")).await.unwrap_err();
        match err {
            ProfileError::FetchFailed { reason, .. } => assert!(reason.contains("admin")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn role_profiles_are_keyed_by_role() {
        let db = test_db().await;
        let user = UserId::new("u1");
        let mut mentor = RoleProfile::new(user.clone(), UserType::Mentor);
        mentor.onboarding_step = 4;
        mentor.onboarding_completed = true;
        mentor.verification = VerificationStatus::Pending;
        mentor.data.insert("expertise".into(), json!(["rust"]));
        db.save_role_profile(&mentor).await.unwrap();

        let fetched = db.role_profile(&user, UserType::Mentor).await.unwrap().unwrap();
        assert!(fetched.onboarding_completed);
        assert_eq!(fetched.verification, VerificationStatus::Pending);
        assert_eq!(fetched.data["expertise"], json!(["rust"]));
        assert!(db.role_profile(&user, UserType::Mentee).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn role_profile_upsert_replaces() {
        let db = test_db().await;
        let user = UserId::new("u1");
        let mut mentee = RoleProfile::new(user.clone(), UserType::Mentee);
        db.save_role_profile(&mentee).await.unwrap();
        mentee.onboarding_step = 1;
        db.save_role_profile(&mentee).await.unwrap();

        let fetched = db.role_profile(&user, UserType::Mentee).await.unwrap().unwrap();
        assert_eq!(fetched.onboarding_step, 1);
        assert_eq!(fetched.verification, VerificationStatus::NotRequired);
    }

    // ── Draft tests ─────────────────────────────────────────────────

    #[tokio::test]
    async fn draft_read_write_remove() {
        let db = test_db().await;
        let key = "mentorgate-onboarding-mentee-step-1";
        assert!(db.read(key).await.unwrap().is_none());

        db.write(key, &json!({"goals": "learn"})).await.unwrap();
        db.write(key, &json!({"goals": "teach"})).await.unwrap();
        assert_eq!(db.read(key).await.unwrap(), Some(json!({"goals": "teach"})));

        assert!(db.remove(key).await.unwrap());
        assert!(!db.remove(key).await.unwrap());
    }

    #[tokio::test]
    async fn draft_must_be_object() {
        let db = test_db().await;
        assert!(matches!(
            db.write("k", &json!([1, 2])).await,
            Err(StorageError::NotAnObject { .. })
        ));
    }

    #[tokio::test]
    async fn local_file_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("gate.db");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.write("mentorgate-signup-data", &json!({"email": "a@b.c"}))
                .await
                .unwrap();
            let mut profile = CanonicalProfile::new(UserId::new("u1"));
            profile.user_type = Some(UserType::Mentee);
            db.save_canonical_profile(&profile).await.unwrap();
        }

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert_eq!(
            db.read("mentorgate-signup-data").await.unwrap(),
            Some(json!({"email": "a@b.c"}))
        );
        let profile = db.canonical_profile(&UserId::new("u1")).await.unwrap().unwrap();
        assert_eq!(profile.user_type, Some(UserType::Mentee));
    }

    #[test]
    fn datetime_formats() {
        let rfc = parse_datetime("2026-01-02T03:04:05+00:00");
        assert_eq!(rfc.to_rfc3339(), "2026-01-02T03:04:05+00:00");
        let sqlite = parse_datetime("2026-01-02 03:04:05");
        assert_eq!(sqlite, rfc);
        assert_eq!(parse_datetime("garbage"), DateTime::<Utc>::MIN_UTC);
    }
}
